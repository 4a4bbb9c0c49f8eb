//! Configuration management for SafeHarbor.
//!
//! This module provides TOML-based configuration loading, parsing, and
//! validation.
//!
//! # Overview
//!
//! SafeHarbor uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `SAFEHARBOR_<SECTION>_<KEY>` overrides
//! - Default values for every setting
//! - Validation of strategies, templates and thresholds on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use safeharbor::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("safeharbor.toml")?;
//! println!("Merge threshold: {}", config.resolve.merge_threshold);
//! println!("Default action: {}", config.transform.default_action);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`DetectConfig`] - rule detector, normalization, provider priorities
//! - [`ResolveConfig`] - merge threshold and span growth limit
//! - [`TransformConfig`] - per-category strategies and templates
//! - [`SecurityConfig`] - salt, token length, date shifting
//! - [`AuditConfig`] - audit trail location and format
//! - [`LoggingConfig`] - rolling JSON log files
//!
//! # Example Configuration
//!
//! ```toml
//! [transform]
//! default_action = "redact"
//!
//! [transform.rules]
//! NAME = "pseudonym"
//! MRN = "hash"
//! DATE = "date_shift"
//! ZIP = "generalize"
//!
//! [security]
//! salt = "${SAFEHARBOR_SALT}"
//! date_shift_mode = "per_subject"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_config_str, load_or_default};
pub use schema::{
    ApplicationConfig, AuditConfig, DateShiftModeConfig, DeidConfig, DetectConfig,
    FragmentConfig, LoggingConfig, ProviderConfig, ResolveConfig, SecurityConfig,
    TransformConfig, MAX_DATE_SHIFT_DAYS,
};
pub use secret::{secret_string, SecretString, SecretValue};

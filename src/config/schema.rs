//! Configuration schema types
//!
//! This module defines the configuration structure for SafeHarbor. Every
//! section has serde defaults so an empty file (or no file) yields a working
//! configuration.

use crate::config::SecretString;
use crate::deid::models::PhiCategory;
use crate::deid::transform::TransformRules;
use crate::domain::errors::DeidError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Largest date offset accepted in either direction, about ten years
pub const MAX_DATE_SHIFT_DAYS: i64 = 3650;

const MAX_FRAGMENT_GAP: usize = 64;

/// Main SafeHarbor configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeidConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Detector ensemble settings
    #[serde(default)]
    pub detect: DetectConfig,

    /// Overlap resolution tunables
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Transformation rules and templates
    #[serde(default)]
    pub transform: TransformConfig,

    /// Salt and date shifting
    #[serde(default)]
    pub security: SecurityConfig,

    /// Audit trail settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeidConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::UnsupportedStrategy`] when a rule names a strategy
    /// the engine does not implement, and [`DeidError::Configuration`] for any
    /// other invalid value.
    pub fn validate(&self) -> Result<(), DeidError> {
        self.application
            .validate()
            .and_then(|_| self.detect.validate())
            .and_then(|_| self.resolve.validate())
            .and_then(|_| self.security.validate())
            .and_then(|_| self.logging.validate())
            .map_err(DeidError::Configuration)?;

        // Strategy names, category keys and templates are checked by building
        // the rule table once.
        TransformRules::from_config(&self.transform)?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (detect and resolve, leave the text untouched)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Detector ensemble configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Run the built-in rule-based detector
    #[serde(default = "default_true")]
    pub enable_rules: bool,

    /// Clean zero-width characters and whitespace runs before detection
    #[serde(default = "default_true")]
    pub normalize_text: bool,

    /// Path to a TOML pattern library replacing the embedded one
    #[serde(default)]
    pub pattern_library: Option<PathBuf>,

    /// Detections below this confidence are discarded before resolution
    #[serde(default)]
    pub min_confidence: f64,

    /// Terms never reported as PHI (section headers, drug names),
    /// compared case-insensitively against the whole matched text
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Per-provider overrides keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl DetectConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "detect.min_confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }

        if let Some(ref path) = self.pattern_library {
            if !path.exists() {
                return Err(format!(
                    "Pattern library file not found: {}",
                    path.display()
                ));
            }
            if path.extension().and_then(|s| s.to_str()) != Some("toml") {
                return Err(format!(
                    "Pattern library must be a TOML file: {}",
                    path.display()
                ));
            }
        }

        for name in self.providers.keys() {
            if name.trim().is_empty() {
                return Err("detect.providers contains an empty provider name".to_string());
            }
        }
        Ok(())
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            enable_rules: true,
            normalize_text: true,
            pattern_library: None,
            min_confidence: 0.0,
            allowlist: Vec::new(),
            providers: BTreeMap::new(),
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether the provider participates in detection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tie-break priority; higher wins at equal confidence
    #[serde(default)]
    pub priority: Option<i32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
        }
    }
}

/// Overlap resolution tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Overlap fraction (of the shorter span) at which two detections merge
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,

    /// Largest relative growth of the top span tolerated when taking the union
    #[serde(default = "default_max_span_growth")]
    pub max_span_growth: f64,

    /// Join same-category fragments separated by a short gap before
    /// resolving overlaps
    #[serde(default = "default_true")]
    pub join_fragments: bool,

    /// Category label to fragment join rule
    #[serde(default = "default_fragments")]
    pub fragments: BTreeMap<String, FragmentConfig>,
}

/// When two detections of one category are parts of the same value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentConfig {
    /// Largest gap between the parts, in bytes
    pub max_gap: usize,

    /// Characters allowed in the gap besides whitespace; any text when unset
    #[serde(default)]
    pub separators: Option<String>,
}

impl ResolveConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.merge_threshold > 0.0 && self.merge_threshold <= 1.0) {
            return Err(format!(
                "resolve.merge_threshold must be within (0, 1], got {}",
                self.merge_threshold
            ));
        }
        if !self.max_span_growth.is_finite() || self.max_span_growth < 0.0 {
            return Err(format!(
                "resolve.max_span_growth must be a non-negative number, got {}",
                self.max_span_growth
            ));
        }
        for (label, fragment) in &self.fragments {
            if label.parse::<PhiCategory>().is_err() {
                return Err(format!("resolve.fragments: unknown category '{label}'"));
            }
            if fragment.max_gap > MAX_FRAGMENT_GAP {
                return Err(format!(
                    "resolve.fragments.{label}.max_gap must be at most {MAX_FRAGMENT_GAP}, got {}",
                    fragment.max_gap
                ));
            }
        }
        Ok(())
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            merge_threshold: default_merge_threshold(),
            max_span_growth: default_max_span_growth(),
            join_fragments: true,
            fragments: default_fragments(),
        }
    }
}

/// Transformation rules
///
/// Strategies are kept as strings here and parsed during validation so that
/// a typo surfaces as an unsupported strategy rather than a TOML error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Strategy for categories without a rule
    #[serde(default = "default_action")]
    pub default_action: String,

    /// Redaction marker; `{category}` is replaced with the category label
    #[serde(default = "default_redact_template")]
    pub redact_template: String,

    /// Category label to strategy name
    #[serde(default = "default_rules")]
    pub rules: BTreeMap<String, String>,

    /// Category label to hash template containing `{code}`
    #[serde(default)]
    pub hash_formats: BTreeMap<String, String>,

    /// Category label to pseudonym template containing `{code}`
    #[serde(default)]
    pub pseudonym_formats: BTreeMap<String, String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            default_action: default_action(),
            redact_template: default_redact_template(),
            rules: default_rules(),
            hash_formats: BTreeMap::new(),
            pseudonym_formats: BTreeMap::new(),
        }
    }
}

/// How date shift offsets are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateShiftModeConfig {
    /// One offset for every document
    #[default]
    Fixed,
    /// Offset derived from the salt and the subject id
    PerSubject,
}

/// Salt, token and date-shift settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret key for token derivation
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub salt: Option<SecretString>,

    /// Hex characters kept from each token (minimum 8)
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// Offset in days for fixed date shifting (may be negative)
    #[serde(default = "default_date_shift_days")]
    pub date_shift_days: i64,

    /// Fixed or per-subject date shifting
    #[serde(default)]
    pub date_shift_mode: DateShiftModeConfig,

    /// Lower bound of per-subject offsets
    #[serde(default = "default_date_shift_min_days")]
    pub date_shift_min_days: i64,

    /// Upper bound of per-subject offsets (inclusive)
    #[serde(default = "default_date_shift_max_days")]
    pub date_shift_max_days: i64,

    /// Persistent pseudonym registry (JSON); in-memory when unset
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl SecurityConfig {
    fn validate(&self) -> Result<(), String> {
        if !(8..=64).contains(&self.token_length) {
            return Err(format!(
                "security.token_length must be between 8 and 64, got {}",
                self.token_length
            ));
        }
        for (name, days) in [
            ("date_shift_days", self.date_shift_days),
            ("date_shift_min_days", self.date_shift_min_days),
            ("date_shift_max_days", self.date_shift_max_days),
        ] {
            if !(-MAX_DATE_SHIFT_DAYS..=MAX_DATE_SHIFT_DAYS).contains(&days) {
                return Err(format!(
                    "security.{name} must be within ±{MAX_DATE_SHIFT_DAYS} days, got {days}"
                ));
            }
        }
        if self.date_shift_min_days > self.date_shift_max_days {
            return Err(format!(
                "security.date_shift_min_days ({}) exceeds date_shift_max_days ({})",
                self.date_shift_min_days, self.date_shift_max_days
            ));
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            salt: None,
            token_length: default_token_length(),
            date_shift_days: default_date_shift_days(),
            date_shift_mode: DateShiftModeConfig::Fixed,
            date_shift_min_days: default_date_shift_min_days(),
            date_shift_max_days: default_date_shift_max_days(),
            registry_path: None,
        }
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging
    #[serde(default)]
    pub enabled: bool,

    /// Audit log file path
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,

    /// Use JSON format for audit logs
    #[serde(default = "default_true")]
    pub json_format: bool,

    /// Keep matched literals in audit records. Debug only; the output then
    /// contains PHI.
    #[serde(default)]
    pub retain_original_text: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
            json_format: true,
            retain_original_text: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path must be set when local logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_merge_threshold() -> f64 {
    0.5
}

fn default_max_span_growth() -> f64 {
    1.0
}

fn default_fragments() -> BTreeMap<String, FragmentConfig> {
    let rule = |max_gap: usize, separators: Option<&str>| FragmentConfig {
        max_gap,
        separators: separators.map(str::to_string),
    };
    BTreeMap::from([
        ("DATE".to_string(), rule(5, Some("/-."))),
        ("MRN".to_string(), rule(5, None)),
        ("NAME".to_string(), rule(3, Some("."))),
    ])
}

fn default_action() -> String {
    "redact".to_string()
}

fn default_redact_template() -> String {
    "[REDACTED:{category}]".to_string()
}

fn default_rules() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("NAME".to_string(), "pseudonym".to_string()),
        ("MRN".to_string(), "hash".to_string()),
        ("DATE".to_string(), "date_shift".to_string()),
    ])
}

fn default_token_length() -> usize {
    8
}

fn default_date_shift_days() -> i64 {
    30
}

fn default_date_shift_min_days() -> i64 {
    30
}

fn default_date_shift_max_days() -> i64 {
    90
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("./audit/deidentification.log")
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

//! CLI command implementations
//!
//! This module contains all CLI command implementations and the exit code
//! conventions they share.

pub mod batch;
pub mod deidentify;
pub mod evaluate;
pub mod init;
pub mod validate;

use crate::config::{load_or_default, DeidConfig};
use crate::deid::DeidEngine;
use crate::domain::DeidError;
use std::path::Path;

/// Everything succeeded
pub const EXIT_OK: i32 = 0;
/// Some documents failed or were skipped
pub const EXIT_PARTIAL: i32 = 1;
/// Configuration could not be loaded or validated
pub const EXIT_CONFIG: i32 = 2;
/// Anything else
pub const EXIT_FATAL: i32 = 5;

/// Maps an error to the exit code it should produce
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let is_config = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DeidError>(),
            Some(DeidError::Configuration(_) | DeidError::UnsupportedStrategy { .. })
        )
    });
    if is_config {
        EXIT_CONFIG
    } else {
        EXIT_FATAL
    }
}

/// Loads configuration, printing the failure and returning the exit code
/// on error
pub(crate) fn load_or_report(config_path: Option<&Path>) -> Result<DeidConfig, i32> {
    load_or_default(config_path).map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        eprintln!("❌ {e}");
        EXIT_CONFIG
    })
}

/// Builds the engine, printing the failure and returning the exit code on
/// error
pub(crate) fn engine_or_report(config: DeidConfig) -> Result<DeidEngine, i32> {
    let engine = DeidEngine::new(config).map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "Failed to initialize engine");
        eprintln!("❌ {e:#}");
        exit_code_for(&e)
    })?;

    if let Some(warning) = engine.salt_warning() {
        eprintln!("⚠️  {warning}");
    }
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_for_configuration_errors() {
        let err = anyhow::Error::from(DeidError::Configuration("bad".to_string()));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);

        let wrapped: anyhow::Result<()> = Err(DeidError::UnsupportedStrategy {
            category: "NAME".to_string(),
            strategy: "shuffle".to_string(),
        })
        .context("Invalid de-identification configuration");
        assert_eq!(exit_code_for(&wrapped.unwrap_err()), EXIT_CONFIG);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let err = anyhow::anyhow!("disk full");
        assert_eq!(exit_code_for(&err), EXIT_FATAL);

        let err = anyhow::Error::from(DeidError::ResolverInvariantViolation("x".to_string()));
        assert_eq!(exit_code_for(&err), EXIT_FATAL);
    }
}

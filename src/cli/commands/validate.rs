//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the SafeHarbor configuration file.

use super::{EXIT_CONFIG, EXIT_OK};
use crate::config::{load_or_default, DateShiftModeConfig, DeidConfig};
use crate::deid::compliance::safe_harbor_categories;
use crate::deid::consistency::ConsistencyEngine;
use crate::deid::detector::DetectorEnsemble;
use crate::deid::transform::TransformRules;
use clap::Args;
use std::path::Path;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: Option<&Path>) -> anyhow::Result<i32> {
        let shown = config_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "safeharbor.toml (or built-in defaults)".to_string());
        tracing::info!(config_path = %shown, "Validating configuration");

        println!("🔍 Validating configuration: {shown}");
        println!();

        // Loading runs validation
        let config = match load_or_default(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        // The pattern library is only compiled when the ensemble is built
        let ensemble = match DetectorEnsemble::from_config(&config.detect) {
            Ok(ensemble) => ensemble,
            Err(e) => {
                println!("❌ Detector setup failed");
                println!("   Error: {e:#}");
                return Ok(EXIT_CONFIG);
            }
        };

        let rules = TransformRules::from_config(&config.transform)?;
        let consistency = ConsistencyEngine::new(&config.security)?;

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Providers: {:?}", ensemble.provider_names());
        println!("  Min Confidence: {}", config.detect.min_confidence);
        println!("  Merge Threshold: {}", config.resolve.merge_threshold);
        println!("  Max Span Growth: {}", config.resolve.max_span_growth);
        println!("  Default Action: {}", rules.default_action());
        for (category, strategy) in rules.rules() {
            println!("    {:20} {strategy}", category.label());
        }
        print_date_shift(&config);
        println!(
            "  Registry: {}",
            config
                .security
                .registry_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );
        println!(
            "  Audit Log: {}",
            if config.audit.enabled {
                config.audit.log_path.display().to_string()
            } else {
                "disabled".to_string()
            }
        );

        let uncovered: Vec<_> = safe_harbor_categories()
            .into_iter()
            .filter(|category| !rules.has_rule(*category))
            .map(|category| category.label())
            .collect();
        if !uncovered.is_empty() {
            println!("  Using default action for: {}", uncovered.join(", "));
        }

        if let Some(warning) = consistency.salt_warning() {
            println!();
            println!("⚠️  {warning}");
            println!("   Set [security].salt or SAFEHARBOR_SECURITY_SALT before processing real data");
        }
        if config.audit.retain_original_text {
            println!();
            println!("⚠️  audit.retain_original_text is enabled; output will contain PHI");
        }
        println!();

        Ok(EXIT_OK)
    }
}

fn print_date_shift(config: &DeidConfig) {
    match config.security.date_shift_mode {
        DateShiftModeConfig::Fixed => println!(
            "  Date Shift: fixed, {} days",
            config.security.date_shift_days
        ),
        DateShiftModeConfig::PerSubject => println!(
            "  Date Shift: per subject, {} to {} days",
            config.security.date_shift_min_days, config.security.date_shift_max_days
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_validate_accepts_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[transform.rules]\nZIP = \"generalize\"").unwrap();

        let code = ValidateArgs {}.execute(Some(file.path())).await.unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_strategy() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[transform.rules]\nNAME = \"shuffle\"").unwrap();

        let code = ValidateArgs {}.execute(Some(file.path())).await.unwrap();
        assert_eq!(code, EXIT_CONFIG);
    }

    #[tokio::test]
    async fn test_validate_missing_file() {
        let code = ValidateArgs {}
            .execute(Some(Path::new("/nonexistent/safeharbor.toml")))
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIG);
    }
}

//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for SafeHarbor using clap.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SafeHarbor - HIPAA Safe Harbor de-identification for clinical text
#[derive(Parser, Debug)]
#[command(name = "safeharbor")]
#[command(version, about, long_about = None)]
#[command(author = "SafeHarbor Contributors")]
pub struct Cli {
    /// Path to configuration file (defaults to ./safeharbor.toml when present)
    #[arg(short, long, env = "SAFEHARBOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SAFEHARBOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// De-identify one document from a file or stdin
    Deidentify(commands::deidentify::DeidentifyArgs),

    /// De-identify every note in a directory
    Batch(commands::batch::BatchArgs),

    /// Score detection against gold annotations
    Evaluate(commands::evaluate::EvaluateArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_deidentify() {
        let cli = Cli::parse_from(["safeharbor", "deidentify", "--input", "note.txt"]);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Deidentify(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["safeharbor", "--config", "custom.toml", "validate-config"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["safeharbor", "--log-level", "debug", "init"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn test_cli_parse_batch() {
        let cli = Cli::parse_from([
            "safeharbor",
            "batch",
            "--input-dir",
            "notes",
            "--output-dir",
            "out",
            "--concurrency",
            "8",
        ]);
        match cli.command {
            Commands::Batch(args) => {
                assert_eq!(args.input_dir, PathBuf::from("notes"));
                assert_eq!(args.concurrency, 8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_evaluate() {
        let cli = Cli::parse_from([
            "safeharbor",
            "evaluate",
            "--input",
            "notes",
            "--iou-threshold",
            "0.5",
        ]);
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.input, PathBuf::from("notes"));
                assert_eq!(args.iou_threshold, 0.5);
                assert_eq!(args.extension, "txt");
                assert!(args.gold.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_deidentify_options() {
        let cli = Cli::parse_from([
            "safeharbor",
            "deidentify",
            "--subject-id",
            "patient-7",
            "--dry-run",
            "--format",
            "text",
        ]);
        match cli.command {
            Commands::Deidentify(args) => {
                assert_eq!(args.subject_id.as_deref(), Some("patient-7"));
                assert!(args.dry_run);
                assert_eq!(args.format, commands::deidentify::OutputFormat::Text);
                assert!(args.input.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

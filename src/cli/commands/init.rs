//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use super::{EXIT_CONFIG, EXIT_FATAL, EXIT_OK};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "safeharbor.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing SafeHarbor configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIG);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Review the transform rules in {}", self.output);
                println!("  2. Create a .env file with SAFEHARBOR_SALT set to a long random secret");
                println!("  3. Validate configuration: safeharbor validate-config");
                println!("  4. Try a dry run: safeharbor deidentify --input note.txt --dry-run");
                println!();
                Ok(EXIT_OK)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# SafeHarbor Configuration File
# HIPAA Safe Harbor de-identification

[application]
log_level = "info"
dry_run = false

[detect]
enable_rules = true
normalize_text = true

[resolve]
merge_threshold = 0.5
max_span_growth = 1.0

[transform]
default_action = "redact"
redact_template = "[REDACTED:{category}]"

[transform.rules]
NAME = "pseudonym"
MRN = "hash"
DATE = "date_shift"
ZIP = "generalize"
AGE_OVER_89 = "generalize"

[security]
salt = "${SAFEHARBOR_SALT}"
token_length = 8
date_shift_mode = "fixed"
date_shift_days = 30

[audit]
enabled = true
log_path = "./audit/deidentification.log"
json_format = true

[logging]
local_enabled = false
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# SafeHarbor Configuration File
# HIPAA Safe Harbor de-identification
#
# This file contains all configuration options with examples and explanations.
# Every value can be overridden with SAFEHARBOR_<SECTION>_<KEY>, for example
# SAFEHARBOR_SECURITY_SALT or SAFEHARBOR_RESOLVE_MERGE_THRESHOLD.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Dry run mode: detect and resolve, report what would change, keep the text
dry_run = false

# ============================================================================
# Detection
# ============================================================================
[detect]
# Run the built-in pattern detector
enable_rules = true

# Remove zero-width characters and collapse whitespace before detection.
# Offsets are always reported against the original text.
normalize_text = true

# Replace the embedded pattern library with your own TOML file
# pattern_library = "./patterns/custom_patterns.toml"

# Drop detections below this confidence (0.0 - 1.0)
min_confidence = 0.0

# Terms never treated as PHI, compared case-insensitively
allowlist = ["Emergency Department", "Metformin"]

# Per-provider settings, keyed by provider name. Higher priority wins ties
# at equal confidence.
[detect.providers.regex]
enabled = true
priority = 10

# [detect.providers.precomputed]
# priority = 20

# ============================================================================
# Overlap Resolution
# ============================================================================
[resolve]
# Fraction of the shorter span two detections must share to be merged
merge_threshold = 0.5

# Largest growth of the winning span, relative to its length, accepted when
# taking the union of a merge group
max_span_growth = 1.0

# Join same-category parts split by a short gap ("03/22" + "1975") first
join_fragments = true

# Per-category join rules; setting any replaces the built-in DATE, MRN and
# NAME rules. Without separators any gap text up to max_gap bytes is accepted.
# [resolve.fragments.DATE]
# max_gap = 5
# separators = "/-."

# ============================================================================
# Transformation
# ============================================================================
[transform]
# Strategy for categories without a rule:
# redact | hash | pseudonym | generalize | preserve
default_action = "redact"

# Redaction marker; {category} becomes the category label
redact_template = "[REDACTED:{category}]"

# Category label to strategy. date_shift is only valid for DATE, and
# preserve is rejected for the 18 Safe Harbor identifiers.
[transform.rules]
NAME = "pseudonym"
MRN = "hash"
DATE = "date_shift"
ZIP = "generalize"
AGE_OVER_89 = "generalize"
IP_ADDRESS = "generalize"
ORGANIZATION = "preserve"

# Hash output per category; {code} is the keyed token
[transform.hash_formats]
MRN = "MRN_{code}"

# Pseudonym output per category
[transform.pseudonym_formats]
NAME = "PERSON_{code}"

# ============================================================================
# Security
# ============================================================================
[security]
# Secret key for tokens and per-subject date shifts. Keep it out of this
# file; a missing salt falls back to an insecure default with a warning.
salt = "${SAFEHARBOR_SALT}"

# Hex characters kept from each token (8 - 64)
token_length = 8

# Date shifting: "fixed" uses date_shift_days for every document,
# "per_subject" derives an offset in [min, max] from the subject id
date_shift_mode = "fixed"
date_shift_days = 30
date_shift_min_days = 30
date_shift_max_days = 90

# Persist issued tokens so they stay stable across runs and processes
# registry_path = "./state/pseudonyms.json"

# ============================================================================
# Audit Trail
# ============================================================================
[audit]
# One entry per processed document, never containing matched text
enabled = true
log_path = "./audit/deidentification.log"
json_format = true

# Keep matched text in per-entity records. Debug only: output contains PHI.
retain_original_text = false

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# Enable local JSON file logging
local_enabled = false

# Local log directory
local_path = "./logs"

# Log rotation (daily, hourly or never)
local_rotation = "daily"
"#
        .to_string()
    }
}

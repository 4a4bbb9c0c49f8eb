//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DateShiftModeConfig, DeidConfig};
use super::secret::secret_string;
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DeidConfig
/// 4. Applies environment variable overrides (SAFEHARBOR_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use safeharbor::config::loader::load_config;
///
/// let config = load_config("safeharbor.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DeidConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(DeidError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DeidError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_str(&contents)
}

/// Parses configuration from TOML text, with substitution, overrides and
/// validation applied exactly as [`load_config`] does
pub fn load_config_str(contents: &str) -> Result<DeidConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: DeidConfig = toml::from_str(&contents)
        .map_err(|e| DeidError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| match e {
        DeidError::Configuration(msg) => {
            DeidError::Configuration(format!("Configuration validation failed: {}", msg))
        }
        other => other,
    })?;

    Ok(config)
}

/// Loads the given file, or `safeharbor.toml` in the working directory, or
/// falls back to built-in defaults when neither exists
///
/// An explicitly named file that is missing is an error.
pub fn load_or_default(path: Option<&Path>) -> Result<DeidConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            let local = PathBuf::from("safeharbor.toml");
            if local.exists() {
                load_config(local)
            } else {
                let mut config = DeidConfig::default();
                apply_env_overrides(&mut config)?;
                config.validate()?;
                Ok(config)
            }
        }
    }
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| DeidError::Configuration(format!("Invalid substitution pattern: {}", e)))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        // Comment lines keep their placeholders untouched
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(DeidError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DeidError::Configuration(format!("Invalid {} value: {}", name, value)))
}

/// Applies environment variable overrides using SAFEHARBOR_* prefix
///
/// Environment variables follow the pattern: SAFEHARBOR_<SECTION>_<KEY>
/// For example: SAFEHARBOR_SECURITY_SALT, SAFEHARBOR_RESOLVE_MERGE_THRESHOLD
fn apply_env_overrides(config: &mut DeidConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_env("SAFEHARBOR_APPLICATION_DRY_RUN", &val)?;
    }

    // Detect overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_DETECT_ENABLE_RULES") {
        config.detect.enable_rules = parse_env("SAFEHARBOR_DETECT_ENABLE_RULES", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_DETECT_NORMALIZE_TEXT") {
        config.detect.normalize_text = parse_env("SAFEHARBOR_DETECT_NORMALIZE_TEXT", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_DETECT_PATTERN_LIBRARY") {
        config.detect.pattern_library = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_DETECT_MIN_CONFIDENCE") {
        config.detect.min_confidence = parse_env("SAFEHARBOR_DETECT_MIN_CONFIDENCE", &val)?;
    }

    // Resolve overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_RESOLVE_MERGE_THRESHOLD") {
        config.resolve.merge_threshold = parse_env("SAFEHARBOR_RESOLVE_MERGE_THRESHOLD", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_RESOLVE_MAX_SPAN_GROWTH") {
        config.resolve.max_span_growth = parse_env("SAFEHARBOR_RESOLVE_MAX_SPAN_GROWTH", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_RESOLVE_JOIN_FRAGMENTS") {
        config.resolve.join_fragments = parse_env("SAFEHARBOR_RESOLVE_JOIN_FRAGMENTS", &val)?;
    }

    // Transform overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_TRANSFORM_DEFAULT_ACTION") {
        config.transform.default_action = val;
    }

    // Security overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_SECURITY_SALT") {
        config.security.salt = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_SECURITY_TOKEN_LENGTH") {
        config.security.token_length = parse_env("SAFEHARBOR_SECURITY_TOKEN_LENGTH", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_SECURITY_DATE_SHIFT_DAYS") {
        config.security.date_shift_days = parse_env("SAFEHARBOR_SECURITY_DATE_SHIFT_DAYS", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_SECURITY_DATE_SHIFT_MODE") {
        config.security.date_shift_mode = match val.to_lowercase().as_str() {
            "fixed" => DateShiftModeConfig::Fixed,
            "per_subject" => DateShiftModeConfig::PerSubject,
            _ => {
                return Err(DeidError::Configuration(format!(
                    "Invalid SAFEHARBOR_SECURITY_DATE_SHIFT_MODE: {}",
                    val
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_SECURITY_REGISTRY_PATH") {
        config.security.registry_path = Some(PathBuf::from(val));
    }

    // Audit overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_AUDIT_ENABLED") {
        config.audit.enabled = parse_env("SAFEHARBOR_AUDIT_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_AUDIT_LOG_PATH") {
        config.audit.log_path = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_AUDIT_JSON_FORMAT") {
        config.audit.json_format = parse_env("SAFEHARBOR_AUDIT_JSON_FORMAT", &val)?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("SAFEHARBOR_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_env("SAFEHARBOR_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("SAFEHARBOR_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

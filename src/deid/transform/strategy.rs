//! Transformation strategies and the per-category rule table

use crate::config::TransformConfig;
use crate::deid::compliance;
use crate::deid::models::PhiCategory;
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const CODE_PLACEHOLDER: &str = "{code}";
const CATEGORY_PLACEHOLDER: &str = "{category}";

/// What happens to a detected entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Replace with the redaction marker
    Redact,
    /// Replace with a salted hash code
    Hash,
    /// Replace with a stable pseudonym
    Pseudonym,
    /// Replace with a coarser value (ZIP3, year, "90+", network prefix)
    Generalize,
    /// Move the date by the document's offset
    DateShift,
    /// Leave the text unchanged
    Preserve,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Self::Redact,
        Self::Hash,
        Self::Pseudonym,
        Self::Generalize,
        Self::DateShift,
        Self::Preserve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redact => "redact",
            Self::Hash => "hash",
            Self::Pseudonym => "pseudonym",
            Self::Generalize => "generalize",
            Self::DateShift => "date_shift",
            Self::Preserve => "preserve",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| format!("unknown strategy '{s}'"))
    }
}

/// Validated rule table built from `[transform]`
#[derive(Debug, Clone)]
pub struct TransformRules {
    rules: BTreeMap<PhiCategory, Strategy>,
    default_action: Strategy,
    redact_template: String,
    hash_formats: BTreeMap<PhiCategory, String>,
    pseudonym_formats: BTreeMap<PhiCategory, String>,
}

impl Default for TransformRules {
    fn default() -> Self {
        Self {
            rules: BTreeMap::from([
                (PhiCategory::Name, Strategy::Pseudonym),
                (PhiCategory::Mrn, Strategy::Hash),
                (PhiCategory::Date, Strategy::DateShift),
            ]),
            default_action: Strategy::Redact,
            redact_template: "[REDACTED:{category}]".to_string(),
            hash_formats: BTreeMap::new(),
            pseudonym_formats: BTreeMap::new(),
        }
    }
}

impl TransformRules {
    /// Parses and validates the rule table
    ///
    /// # Errors
    ///
    /// - [`DeidError::UnsupportedStrategy`] for an unknown strategy name, or
    ///   `date_shift` on a category other than `DATE`
    /// - [`DeidError::Configuration`] for unknown category keys, templates
    ///   without their placeholder, and `preserve` on a Safe Harbor category
    pub fn from_config(config: &TransformConfig) -> Result<Self> {
        let default_action = parse_strategy("default", &config.default_action)?;
        if default_action == Strategy::DateShift {
            return Err(DeidError::UnsupportedStrategy {
                category: "default".to_string(),
                strategy: config.default_action.clone(),
            });
        }

        let mut rules = BTreeMap::new();
        for (key, value) in &config.rules {
            let category = parse_category("transform.rules", key)?;
            let strategy = parse_strategy(category.label(), value)?;
            if strategy == Strategy::DateShift && category != PhiCategory::Date {
                return Err(DeidError::UnsupportedStrategy {
                    category: category.label().to_string(),
                    strategy: value.clone(),
                });
            }
            rules.insert(category, strategy);
        }

        if !config.redact_template.contains(CATEGORY_PLACEHOLDER) {
            return Err(DeidError::Configuration(format!(
                "transform.redact_template must contain {CATEGORY_PLACEHOLDER}"
            )));
        }

        let hash_formats = parse_templates("transform.hash_formats", &config.hash_formats)?;
        let pseudonym_formats =
            parse_templates("transform.pseudonym_formats", &config.pseudonym_formats)?;

        let table = Self {
            rules,
            default_action,
            redact_template: config.redact_template.clone(),
            hash_formats,
            pseudonym_formats,
        };
        compliance::validate_rules(&table)?;
        Ok(table)
    }

    /// Strategy for a category; categories without a rule use the default
    pub fn strategy_for(&self, category: PhiCategory) -> Strategy {
        self.rules
            .get(&category)
            .copied()
            .unwrap_or(self.default_action)
    }

    pub fn has_rule(&self, category: PhiCategory) -> bool {
        self.rules.contains_key(&category)
    }

    /// Explicit rules in category order
    pub fn rules(&self) -> impl Iterator<Item = (PhiCategory, Strategy)> + '_ {
        self.rules.iter().map(|(c, s)| (*c, *s))
    }

    pub fn default_action(&self) -> Strategy {
        self.default_action
    }

    /// Redaction marker for a category
    pub fn redaction(&self, category: PhiCategory) -> String {
        self.redaction_labeled(category.label())
    }

    /// Redaction marker with an arbitrary label, e.g. `YEAR`
    pub fn redaction_labeled(&self, label: &str) -> String {
        self.redact_template.replace(CATEGORY_PLACEHOLDER, label)
    }

    /// Hash replacement, `MRN_{code}` style unless configured
    pub fn hash_replacement(&self, category: PhiCategory, code: &str) -> String {
        match self.hash_formats.get(&category) {
            Some(template) => template.replace(CODE_PLACEHOLDER, code),
            None => format!("{}_{code}", category.label()),
        }
    }

    /// Pseudonym replacement, `PERSON_{code}` for names unless configured
    pub fn pseudonym_replacement(&self, category: PhiCategory, code: &str) -> String {
        match self.pseudonym_formats.get(&category) {
            Some(template) => template.replace(CODE_PLACEHOLDER, code),
            None => format!("{}_{code}", default_pseudonym_prefix(category)),
        }
    }
}

fn default_pseudonym_prefix(category: PhiCategory) -> &'static str {
    match category {
        PhiCategory::Name => "PERSON",
        other => other.label(),
    }
}

fn parse_strategy(category: &str, value: &str) -> Result<Strategy> {
    value.parse().map_err(|_| DeidError::UnsupportedStrategy {
        category: category.to_string(),
        strategy: value.to_string(),
    })
}

fn parse_category(section: &str, key: &str) -> Result<PhiCategory> {
    key.parse()
        .map_err(|e| DeidError::Configuration(format!("{section}: {e}")))
}

fn parse_templates(
    section: &str,
    templates: &BTreeMap<String, String>,
) -> Result<BTreeMap<PhiCategory, String>> {
    let mut parsed = BTreeMap::new();
    for (key, template) in templates {
        let category = parse_category(section, key)?;
        if template.matches(CODE_PLACEHOLDER).count() != 1 {
            return Err(DeidError::Configuration(format!(
                "{section}.{key} must contain {CODE_PLACEHOLDER} exactly once"
            )));
        }
        parsed.insert(category, template.clone());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_rule(category: &str, strategy: &str) -> TransformConfig {
        let mut config = TransformConfig::default();
        config.rules.insert(category.to_string(), strategy.to_string());
        config
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("date_shift".parse::<Strategy>().unwrap(), Strategy::DateShift);
        assert_eq!(" Date-Shift ".parse::<Strategy>().unwrap(), Strategy::DateShift);
        assert!("scramble".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_default_rules_and_templates() {
        let rules = TransformRules::from_config(&TransformConfig::default()).unwrap();
        assert_eq!(rules.strategy_for(PhiCategory::Name), Strategy::Pseudonym);
        assert_eq!(rules.strategy_for(PhiCategory::PhoneNumber), Strategy::Redact);
        assert_eq!(rules.redaction(PhiCategory::PhoneNumber), "[REDACTED:PHONE_NUMBER]");
        assert_eq!(rules.hash_replacement(PhiCategory::Mrn, "ab12cd34"), "MRN_ab12cd34");
        assert_eq!(
            rules.pseudonym_replacement(PhiCategory::Name, "ab12cd34"),
            "PERSON_ab12cd34"
        );
    }

    #[test]
    fn test_custom_templates() {
        let mut config = TransformConfig::default();
        config
            .hash_formats
            .insert("MRN".to_string(), "MRN-{code}".to_string());
        config.redact_template = "<{category}>".to_string();
        let rules = TransformRules::from_config(&config).unwrap();
        assert_eq!(rules.hash_replacement(PhiCategory::Mrn, "x"), "MRN-x");
        assert_eq!(rules.redaction_labeled("YEAR"), "<YEAR>");
    }

    #[test]
    fn test_unknown_strategy_is_unsupported() {
        let err = TransformRules::from_config(&config_with_rule("NAME", "scramble")).unwrap_err();
        assert!(matches!(
            err,
            DeidError::UnsupportedStrategy { ref category, ref strategy }
                if category == "NAME" && strategy == "scramble"
        ));
    }

    #[test]
    fn test_date_shift_only_for_dates() {
        let err = TransformRules::from_config(&config_with_rule("ZIP", "date_shift")).unwrap_err();
        assert!(matches!(err, DeidError::UnsupportedStrategy { .. }));
    }

    #[test]
    fn test_unknown_category_and_bad_templates() {
        assert!(matches!(
            TransformRules::from_config(&config_with_rule("SPACESHIP", "redact")),
            Err(DeidError::Configuration(_))
        ));

        let mut config = TransformConfig::default();
        config
            .pseudonym_formats
            .insert("NAME".to_string(), "PERSON".to_string());
        assert!(matches!(
            TransformRules::from_config(&config),
            Err(DeidError::Configuration(_))
        ));

        let config = TransformConfig {
            redact_template: "[REDACTED]".to_string(),
            ..Default::default()
        };
        assert!(TransformRules::from_config(&config).is_err());
    }

    #[test]
    fn test_preserve_on_identifier_rejected() {
        let err = TransformRules::from_config(&config_with_rule("US_SSN", "preserve")).unwrap_err();
        assert!(matches!(err, DeidError::Configuration(_)));

        assert!(TransformRules::from_config(&config_with_rule("ORGANIZATION", "preserve")).is_ok());
    }
}

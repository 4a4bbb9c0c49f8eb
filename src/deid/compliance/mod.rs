//! HIPAA Safe Harbor compliance rules
//!
//! The Safe Harbor method (45 CFR §164.514(b)(2)) lists 18 identifiers that
//! must be removed before data counts as de-identified. Every category that
//! stands for one of them must be transformed; configuration that would
//! leave one in place is rejected.

use crate::deid::models::PhiCategory;
use crate::deid::transform::{Strategy, TransformRules};
use crate::domain::errors::DeidError;
use crate::domain::result::Result;

/// One of the 18 Safe Harbor identifiers and the categories that carry it
#[derive(Debug, Clone, Copy)]
pub struct SafeHarborIdentifier {
    /// Paragraph letter in §164.514(b)(2)(i)
    pub clause: char,
    pub description: &'static str,
    pub categories: &'static [PhiCategory],
}

/// The 18 Safe Harbor identifiers
pub const SAFE_HARBOR_IDENTIFIERS: [SafeHarborIdentifier; 18] = [
    SafeHarborIdentifier {
        clause: 'A',
        description: "Names",
        categories: &[PhiCategory::Name],
    },
    SafeHarborIdentifier {
        clause: 'B',
        description: "Geographic subdivisions smaller than a state",
        categories: &[PhiCategory::Location, PhiCategory::Zip],
    },
    SafeHarborIdentifier {
        clause: 'C',
        description: "Dates (except year) and ages over 89",
        categories: &[PhiCategory::Date, PhiCategory::AgeOver89],
    },
    SafeHarborIdentifier {
        clause: 'D',
        description: "Telephone numbers",
        categories: &[PhiCategory::PhoneNumber],
    },
    SafeHarborIdentifier {
        clause: 'E',
        description: "Fax numbers",
        categories: &[PhiCategory::FaxNumber],
    },
    SafeHarborIdentifier {
        clause: 'F',
        description: "Email addresses",
        categories: &[PhiCategory::EmailAddress],
    },
    SafeHarborIdentifier {
        clause: 'G',
        description: "Social Security numbers",
        categories: &[PhiCategory::UsSsn],
    },
    SafeHarborIdentifier {
        clause: 'H',
        description: "Medical record numbers",
        categories: &[PhiCategory::Mrn],
    },
    SafeHarborIdentifier {
        clause: 'I',
        description: "Health plan beneficiary numbers",
        categories: &[PhiCategory::HealthPlanId],
    },
    SafeHarborIdentifier {
        clause: 'J',
        description: "Account numbers",
        categories: &[PhiCategory::AccountNumber],
    },
    SafeHarborIdentifier {
        clause: 'K',
        description: "Certificate/license numbers",
        categories: &[PhiCategory::LicenseNumber],
    },
    SafeHarborIdentifier {
        clause: 'L',
        description: "Vehicle identifiers and serial numbers",
        categories: &[PhiCategory::VehicleId],
    },
    SafeHarborIdentifier {
        clause: 'M',
        description: "Device identifiers and serial numbers",
        categories: &[PhiCategory::DeviceId],
    },
    SafeHarborIdentifier {
        clause: 'N',
        description: "Web URLs",
        categories: &[PhiCategory::Url],
    },
    SafeHarborIdentifier {
        clause: 'O',
        description: "IP addresses",
        categories: &[PhiCategory::IpAddress],
    },
    SafeHarborIdentifier {
        clause: 'P',
        description: "Biometric identifiers",
        categories: &[PhiCategory::BiometricId],
    },
    SafeHarborIdentifier {
        clause: 'Q',
        description: "Full-face photographs and comparable images",
        categories: &[PhiCategory::PhotoId],
    },
    SafeHarborIdentifier {
        clause: 'R',
        description: "Any other unique identifying number, characteristic, or code",
        categories: &[PhiCategory::EncounterId, PhiCategory::OtherId],
    },
];

/// All categories that stand for a Safe Harbor identifier
pub fn safe_harbor_categories() -> Vec<PhiCategory> {
    SAFE_HARBOR_IDENTIFIERS
        .iter()
        .flat_map(|id| id.categories.iter().copied())
        .collect()
}

/// The identifier a category belongs to, if any
pub fn identifier_for(category: PhiCategory) -> Option<&'static SafeHarborIdentifier> {
    SAFE_HARBOR_IDENTIFIERS
        .iter()
        .find(|id| id.categories.contains(&category))
}

/// Rejects a strategy that would leave a Safe Harbor identifier in the output
pub fn check_strategy(category: PhiCategory, strategy: Strategy) -> Result<()> {
    if strategy == Strategy::Preserve && category.is_safe_harbor_identifier() {
        let identifier = identifier_for(category)
            .map(|id| format!(" (Safe Harbor identifier {}: {})", id.clause, id.description))
            .unwrap_or_default();
        return Err(DeidError::Configuration(format!(
            "transform.rules.{category} = \"preserve\" would leave PHI in the output{identifier}"
        )));
    }
    Ok(())
}

/// Checks every explicit rule and the default action
///
/// `preserve` as the default action is rejected when any Safe Harbor
/// category is left without an explicit rule.
pub fn validate_rules(rules: &TransformRules) -> Result<()> {
    for (category, strategy) in rules.rules() {
        check_strategy(category, strategy)?;
    }

    if rules.default_action() == Strategy::Preserve {
        let uncovered: Vec<String> = safe_harbor_categories()
            .into_iter()
            .filter(|c| !rules.has_rule(*c))
            .map(|c| c.label().to_string())
            .collect();
        if !uncovered.is_empty() {
            return Err(DeidError::Configuration(format!(
                "transform.default_action = \"preserve\" would leave these identifiers in the output: {}",
                uncovered.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;

    #[test]
    fn test_eighteen_identifiers_cover_all_regulated_categories() {
        let categories = safe_harbor_categories();
        for category in PhiCategory::ALL {
            assert_eq!(
                categories.contains(&category),
                category.is_safe_harbor_identifier(),
                "{category}"
            );
        }
    }

    #[test]
    fn test_preserve_rejected_for_identifiers_only() {
        assert!(check_strategy(PhiCategory::UsSsn, Strategy::Preserve).is_err());
        assert!(check_strategy(PhiCategory::Organization, Strategy::Preserve).is_ok());
        assert!(check_strategy(PhiCategory::UsSsn, Strategy::Hash).is_ok());
    }

    #[test]
    fn test_preserve_default_action_rejected() {
        let config = TransformConfig {
            default_action: "preserve".to_string(),
            ..Default::default()
        };
        let err = TransformRules::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("default_action"));
    }

    #[test]
    fn test_identifier_lookup() {
        assert_eq!(identifier_for(PhiCategory::Zip).map(|id| id.clause), Some('B'));
        assert!(identifier_for(PhiCategory::Other).is_none());
    }
}

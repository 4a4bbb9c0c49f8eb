//! PHI category taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// PHI category covering the 18 HIPAA Safe Harbor identifiers plus the two
/// non-identifier catch-alls detectors commonly emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhiCategory {
    /// Names (first, middle, last, maiden, initials)
    Name,
    /// Geographic subdivisions smaller than a state
    Location,
    /// ZIP codes
    Zip,
    /// All date elements except year
    Date,
    /// Ages over 89
    AgeOver89,
    /// Telephone numbers
    PhoneNumber,
    /// Fax numbers
    FaxNumber,
    /// Email addresses
    EmailAddress,
    /// Social Security numbers
    UsSsn,
    /// Medical record numbers
    Mrn,
    /// Health plan beneficiary numbers
    HealthPlanId,
    /// Account numbers
    AccountNumber,
    /// Certificate and license numbers
    LicenseNumber,
    /// Vehicle identifiers and plates
    VehicleId,
    /// Device identifiers and serial numbers
    DeviceId,
    /// Web URLs
    Url,
    /// IP addresses
    IpAddress,
    /// Biometric identifiers
    BiometricId,
    /// Full-face photographs and comparable images
    PhotoId,
    /// Encounter and visit identifiers
    EncounterId,
    /// Any other unique identifying number or code
    OtherId,
    /// Facilities and organizations
    Organization,
    /// Unclassified
    Other,
}

impl PhiCategory {
    /// Every category, in declaration order
    pub const ALL: [PhiCategory; 23] = [
        Self::Name,
        Self::Location,
        Self::Zip,
        Self::Date,
        Self::AgeOver89,
        Self::PhoneNumber,
        Self::FaxNumber,
        Self::EmailAddress,
        Self::UsSsn,
        Self::Mrn,
        Self::HealthPlanId,
        Self::AccountNumber,
        Self::LicenseNumber,
        Self::VehicleId,
        Self::DeviceId,
        Self::Url,
        Self::IpAddress,
        Self::BiometricId,
        Self::PhotoId,
        Self::EncounterId,
        Self::OtherId,
        Self::Organization,
        Self::Other,
    ];

    /// Canonical label, identical to the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Location => "LOCATION",
            Self::Zip => "ZIP",
            Self::Date => "DATE",
            Self::AgeOver89 => "AGE_OVER_89",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::FaxNumber => "FAX_NUMBER",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::UsSsn => "US_SSN",
            Self::Mrn => "MRN",
            Self::HealthPlanId => "HEALTH_PLAN_ID",
            Self::AccountNumber => "ACCOUNT_NUMBER",
            Self::LicenseNumber => "LICENSE_NUMBER",
            Self::VehicleId => "VEHICLE_ID",
            Self::DeviceId => "DEVICE_ID",
            Self::Url => "URL",
            Self::IpAddress => "IP_ADDRESS",
            Self::BiometricId => "BIOMETRIC_ID",
            Self::PhotoId => "PHOTO_ID",
            Self::EncounterId => "ENCOUNTER_ID",
            Self::OtherId => "OTHER_ID",
            Self::Organization => "ORGANIZATION",
            Self::Other => "OTHER",
        }
    }

    /// Check if this category is one of the Safe Harbor identifiers
    pub fn is_safe_harbor_identifier(&self) -> bool {
        !matches!(self, Self::Organization | Self::Other)
    }

    /// Whether token normalization folds case for this category
    ///
    /// Codes and addresses compare case-insensitively; names, places and
    /// dates keep their case.
    pub fn case_insensitive(&self) -> bool {
        !matches!(
            self,
            Self::Name
                | Self::Location
                | Self::Organization
                | Self::Date
                | Self::AgeOver89
                | Self::Other
        )
    }

    /// Whether internal whitespace runs are collapsed during normalization
    pub fn collapses_whitespace(&self) -> bool {
        matches!(self, Self::Name | Self::Location | Self::Organization)
    }

    /// Specificity rank used as a tie-break; higher is more specific
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Url => 22,
            Self::EmailAddress => 21,
            Self::IpAddress => 20,
            Self::UsSsn => 19,
            Self::VehicleId => 18,
            Self::DeviceId => 17,
            Self::HealthPlanId => 16,
            Self::AccountNumber => 15,
            Self::LicenseNumber => 14,
            Self::Mrn => 13,
            Self::EncounterId => 12,
            Self::FaxNumber => 11,
            Self::PhoneNumber => 10,
            Self::Date => 9,
            Self::PhotoId => 8,
            Self::BiometricId => 7,
            Self::Name => 6,
            Self::Zip => 5,
            Self::Location => 4,
            Self::AgeOver89 => 3,
            Self::OtherId => 2,
            Self::Organization => 1,
            Self::Other => 0,
        }
    }
}

impl fmt::Display for PhiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PhiCategory {
    type Err = String;

    /// Parses canonical labels and the aliases used by common detector vendors
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "NAME" | "PERSON" | "PATIENT" | "DOCTOR" | "PER" => Ok(Self::Name),
            "LOCATION" | "ADDRESS" | "CITY" | "STREET" | "STATE" | "COUNTY" | "LOC" | "GPE"
            | "GEOGRAPHIC_SUBDIVISION" | "GEOGRAPHIC_LOCATION" => Ok(Self::Location),
            "ZIP" | "ZIP_CODE" | "ZIPCODE" | "POSTAL_CODE" => Ok(Self::Zip),
            "DATE" | "DATE_TIME" | "DOB" => Ok(Self::Date),
            "AGE_OVER_89" | "AGE" => Ok(Self::AgeOver89),
            "PHONE_NUMBER" | "PHONE" | "TELEPHONE" => Ok(Self::PhoneNumber),
            "FAX_NUMBER" | "FAX" => Ok(Self::FaxNumber),
            "EMAIL_ADDRESS" | "EMAIL" => Ok(Self::EmailAddress),
            "US_SSN" | "SSN" => Ok(Self::UsSsn),
            "MRN" | "MEDICAL_RECORD_NUMBER" | "MEDICAL_RECORD" => Ok(Self::Mrn),
            "HEALTH_PLAN_ID" | "HEALTH_PLAN" | "HEALTH_PLAN_BENEFICIARY_NUMBER" => {
                Ok(Self::HealthPlanId)
            }
            "ACCOUNT_NUMBER" | "ACCOUNT" | "US_BANK_NUMBER" | "IBAN_CODE" => {
                Ok(Self::AccountNumber)
            }
            "LICENSE_NUMBER" | "LICENSE" | "US_DRIVER_LICENSE" | "CERTIFICATE_NUMBER" => {
                Ok(Self::LicenseNumber)
            }
            "VEHICLE_ID" | "VIN" | "LICENSE_PLATE" => Ok(Self::VehicleId),
            "DEVICE_ID" | "DEVICE" | "SERIAL_NUMBER" => Ok(Self::DeviceId),
            "URL" => Ok(Self::Url),
            "IP_ADDRESS" | "IP" => Ok(Self::IpAddress),
            "BIOMETRIC_ID" | "BIOMETRIC" => Ok(Self::BiometricId),
            "PHOTO_ID" | "PHOTO" | "FULL_FACE_PHOTO" => Ok(Self::PhotoId),
            "ENCOUNTER_ID" | "ENCOUNTER" | "VISIT_ID" => Ok(Self::EncounterId),
            "OTHER_ID" | "ID" | "IDENTIFIER" | "IN_PAN" => Ok(Self::OtherId),
            "ORGANIZATION" | "ORG" | "HOSPITAL" | "FACILITY" => Ok(Self::Organization),
            "OTHER" => Ok(Self::Other),
            _ => Err(format!("Unknown PHI category: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trips_through_from_str() {
        for category in PhiCategory::ALL {
            assert_eq!(category.label().parse::<PhiCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_vendor_aliases() {
        assert_eq!("PERSON".parse::<PhiCategory>().unwrap(), PhiCategory::Name);
        assert_eq!("ssn".parse::<PhiCategory>().unwrap(), PhiCategory::UsSsn);
        assert_eq!(
            "medical record number".parse::<PhiCategory>().unwrap(),
            PhiCategory::Mrn
        );
        assert_eq!("VIN".parse::<PhiCategory>().unwrap(), PhiCategory::VehicleId);
        assert!("SPACESHIP".parse::<PhiCategory>().is_err());
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&PhiCategory::AgeOver89).unwrap();
        assert_eq!(json, "\"AGE_OVER_89\"");
        let parsed: PhiCategory = serde_json::from_str("\"PHONE_NUMBER\"").unwrap();
        assert_eq!(parsed, PhiCategory::PhoneNumber);
    }

    #[test]
    fn test_safe_harbor_membership() {
        assert!(PhiCategory::Name.is_safe_harbor_identifier());
        assert!(PhiCategory::OtherId.is_safe_harbor_identifier());
        assert!(!PhiCategory::Organization.is_safe_harbor_identifier());
        assert!(!PhiCategory::Other.is_safe_harbor_identifier());
    }

    #[test]
    fn test_generic_categories_are_least_specific() {
        for category in PhiCategory::ALL {
            if !matches!(
                category,
                PhiCategory::Other | PhiCategory::OtherId | PhiCategory::Organization
            ) {
                assert!(category.specificity() > PhiCategory::OtherId.specificity());
            }
        }
    }
}

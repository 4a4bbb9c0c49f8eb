//! Deterministic tokens and date offsets
//!
//! The same identifier always maps to the same token for a given salt, in
//! every document and every run. Tokens are truncated HMAC-SHA256 digests of
//! the category label and the normalized value, keyed with the salt.

pub mod dates;
pub mod registry;

pub use dates::{DateParser, DateShiftOutcome};
pub use registry::{InMemoryRegistry, JsonFileRegistry, PseudonymRegistry};

use crate::config::{DateShiftModeConfig, SecurityConfig};
use crate::deid::models::PhiCategory;
use crate::domain::errors::DeidError;
use crate::domain::ids::SubjectId;
use crate::domain::result::Result;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Once};

type HmacSha256 = Hmac<Sha256>;

/// Salt used when none is configured. Tokens derived from it are not secret.
pub const INSECURE_DEFAULT_SALT: &str = "DEFAULT_SALT_CHANGE_IN_PRODUCTION";

/// Placeholder salts shipped in sample configurations
pub const DOCUMENTED_DEFAULT_SALTS: [&str; 2] = [
    "DEFAULT_SALT_CHANGE_IN_PRODUCTION",
    "DEFAULT_SALT_REPLACE_IN_PRODUCTION",
];

const SEPARATOR: u8 = 0x1F;
const MIN_TOKEN_LENGTH: usize = 8;

static WEAK_SALT_WARNING: Once = Once::new();

/// Identity of a value for token purposes
///
/// Debug output omits the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConsistencyKey {
    pub category: PhiCategory,
    pub normalized: String,
}

impl ConsistencyKey {
    /// Normalizes `value` the way tokens for `category` compare
    pub fn new(category: PhiCategory, value: &str) -> Self {
        Self {
            category,
            normalized: normalize_value(category, value),
        }
    }
}

impl fmt::Debug for ConsistencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyKey")
            .field("category", &self.category)
            .field("normalized", &"[REDACTED]")
            .finish()
    }
}

/// Trims, then case-folds identifiers and collapses whitespace in names
pub fn normalize_value(category: PhiCategory, value: &str) -> String {
    let trimmed = value.trim();
    let spaced = if category.collapses_whitespace() {
        trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        trimmed.to_string()
    };
    if category.case_insensitive() {
        spaced.to_lowercase()
    } else {
        spaced
    }
}

/// How date offsets are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateShiftMode {
    /// Every document moves by the same number of days
    Fixed(i64),
    /// Each subject gets a stable offset in `min_days..=max_days`
    PerSubject { min_days: i64, max_days: i64 },
}

/// Derives tokens, fingerprints and date offsets from the salt
pub struct ConsistencyEngine {
    mac: HmacSha256,
    token_length: usize,
    fixed_shift_days: i64,
    mode: DateShiftMode,
    salt_warning: Option<DeidError>,
    dates: DateParser,
    registry: Option<Arc<dyn PseudonymRegistry>>,
}

impl ConsistencyEngine {
    /// Builds the engine from `[security]`
    ///
    /// A weak salt is not an error: the insecure default is used, a warning
    /// is logged once per process, and [`salt_warning`](Self::salt_warning)
    /// reports it.
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let configured = config.salt.as_ref().map(|s| s.expose_secret());

        let weak_reason = match configured {
            None => Some("no salt configured".to_string()),
            Some(salt) if salt.is_blank() => Some("salt is empty".to_string()),
            Some(salt) if is_documented_default(salt.as_ref()) => {
                Some("salt is a documented placeholder".to_string())
            }
            Some(_) => None,
        };

        let key: &[u8] = match (&weak_reason, configured) {
            (None, Some(salt)) => salt.as_bytes(),
            _ => INSECURE_DEFAULT_SALT.as_bytes(),
        };
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| DeidError::Configuration(format!("Invalid salt: {e}")))?;

        let salt_warning = weak_reason.map(|reason| {
            WEAK_SALT_WARNING.call_once(|| {
                tracing::warn!(
                    reason = %reason,
                    "Weak salt: tokens can be reversed by anyone who knows the default. \
                     Set security.salt or SAFEHARBOR_SECURITY_SALT"
                );
            });
            DeidError::WeakSalt(reason)
        });

        let mode = match config.date_shift_mode {
            DateShiftModeConfig::Fixed => DateShiftMode::Fixed(config.date_shift_days),
            DateShiftModeConfig::PerSubject => DateShiftMode::PerSubject {
                min_days: config.date_shift_min_days,
                max_days: config.date_shift_max_days,
            },
        };

        Ok(Self {
            mac,
            token_length: config.token_length.max(MIN_TOKEN_LENGTH),
            fixed_shift_days: config.date_shift_days,
            mode,
            salt_warning,
            dates: DateParser::new()?,
            registry: None,
        })
    }

    /// Routes token issuance through a shared registry
    pub fn with_registry(mut self, registry: Arc<dyn PseudonymRegistry>) -> Self {
        self.set_registry(registry);
        self
    }

    pub fn set_registry(&mut self, registry: Arc<dyn PseudonymRegistry>) {
        self.registry = Some(registry);
    }

    pub fn registry(&self) -> Option<&Arc<dyn PseudonymRegistry>> {
        self.registry.as_ref()
    }

    /// The weak-salt condition, if the configured salt is not usable
    pub fn salt_warning(&self) -> Option<&DeidError> {
        self.salt_warning.as_ref()
    }

    pub fn mode(&self) -> DateShiftMode {
        self.mode
    }

    pub fn dates(&self) -> &DateParser {
        &self.dates
    }

    fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 {
                mac.update(&[SEPARATOR]);
            }
            mac.update(part);
        }
        mac.finalize().into_bytes().to_vec()
    }

    /// Deterministic token for a key; a pure function of salt and key
    pub fn token(&self, key: &ConsistencyKey) -> String {
        let digest = self.digest(&[key.category.label().as_bytes(), key.normalized.as_bytes()]);
        let mut token = hex::encode(digest);
        token.truncate(self.token_length);
        token
    }

    /// Registry key for a consistency key; never contains the value itself
    pub fn fingerprint(&self, key: &ConsistencyKey) -> String {
        hex::encode(self.digest(&[
            b"registry".as_slice(),
            key.category.label().as_bytes(),
            key.normalized.as_bytes(),
        ]))
    }

    /// The token the registry holds for `key`, or the derived token
    pub fn issue_token(&self, key: &ConsistencyKey) -> Result<String> {
        match self.registry {
            Some(ref registry) => registry
                .get_or_insert_with(&self.fingerprint(key), &|| self.token(key))
                .map_err(|e| DeidError::Other(format!("Pseudonym registry failure: {e:#}"))),
            None => Ok(self.token(key)),
        }
    }

    /// Offset in days for a subject
    ///
    /// Per-subject mode falls back to the fixed offset when no subject is
    /// given.
    pub fn date_shift_days(&self, subject: Option<&SubjectId>) -> i64 {
        match (self.mode, subject) {
            (DateShiftMode::Fixed(days), _) => days,
            (DateShiftMode::PerSubject { .. }, None) => self.fixed_shift_days,
            (DateShiftMode::PerSubject { min_days, max_days }, Some(subject)) => {
                let span = max_days.saturating_sub(min_days).max(0) as u64 + 1;
                let digest = self.digest(&[b"date_shift".as_slice(), subject.expose().as_bytes()]);
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                min_days.saturating_add((u64::from_be_bytes(head) % span) as i64)
            }
        }
    }

    /// Starts a per-document session
    pub fn session(&self, subject: Option<SubjectId>) -> ConsistencySession<'_> {
        let shift_days = self.date_shift_days(subject.as_ref());
        ConsistencySession {
            engine: self,
            shift_days,
            cache: HashMap::new(),
        }
    }
}

impl fmt::Debug for ConsistencyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyEngine")
            .field("token_length", &self.token_length)
            .field("mode", &self.mode)
            .field("weak_salt", &self.salt_warning.is_some())
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Token cache and date offset for one document
pub struct ConsistencySession<'a> {
    engine: &'a ConsistencyEngine,
    shift_days: i64,
    cache: HashMap<ConsistencyKey, String>,
}

impl<'a> ConsistencySession<'a> {
    /// Token for a value, reusing the one issued earlier in this document
    pub fn token_for(&mut self, category: PhiCategory, value: &str) -> Result<String> {
        let key = ConsistencyKey::new(category, value);
        if let Some(token) = self.cache.get(&key) {
            return Ok(token.clone());
        }
        let token = self.engine.issue_token(&key)?;
        self.cache.insert(key, token.clone());
        Ok(token)
    }

    pub fn shift_date(&self, value: &str) -> DateShiftOutcome {
        self.engine.dates.shift(value, self.shift_days)
    }

    pub fn shift_days(&self) -> i64 {
        self.shift_days
    }

    pub fn engine(&self) -> &'a ConsistencyEngine {
        self.engine
    }

    /// Distinct values tokenized so far
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn is_documented_default(salt: &str) -> bool {
    DOCUMENTED_DEFAULT_SALTS.iter().any(|d| *d == salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn config_with_salt(salt: &str) -> SecurityConfig {
        SecurityConfig {
            salt: Some(secret_string(salt.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_is_deterministic_and_truncated() {
        let engine = ConsistencyEngine::new(&config_with_salt("s3cret")).unwrap();
        let key = ConsistencyKey::new(PhiCategory::Mrn, "123456789");
        let a = engine.token(&key);
        let b = engine.token(&key);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(engine.salt_warning().is_none());
    }

    #[test]
    fn test_token_is_lowercase_hex_of_keyed_digest() {
        let engine = ConsistencyEngine::new(&config_with_salt("s3cret")).unwrap();
        let key = ConsistencyKey::new(PhiCategory::Mrn, " 123456789 ");

        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(b"MRN\x1F123456789");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(engine.token(&key), expected[..8]);
        let fingerprint = engine.fingerprint(&key);
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(fingerprint, expected);
    }

    #[test]
    fn test_salt_and_category_change_token() {
        let one = ConsistencyEngine::new(&config_with_salt("one")).unwrap();
        let two = ConsistencyEngine::new(&config_with_salt("two")).unwrap();
        let key = ConsistencyKey::new(PhiCategory::Mrn, "42");
        assert_ne!(one.token(&key), two.token(&key));
        assert_ne!(
            one.token(&key),
            one.token(&ConsistencyKey::new(PhiCategory::AccountNumber, "42"))
        );
    }

    #[test]
    fn test_normalization_rules() {
        assert_eq!(
            normalize_value(PhiCategory::EmailAddress, "  John@Example.COM "),
            "john@example.com"
        );
        assert_eq!(normalize_value(PhiCategory::Name, "John   Smith"), "John Smith");
        assert_ne!(
            ConsistencyKey::new(PhiCategory::Name, "john smith"),
            ConsistencyKey::new(PhiCategory::Name, "John Smith")
        );
    }

    #[test]
    fn test_weak_salts_warn_but_work() {
        for config in [
            SecurityConfig::default(),
            config_with_salt(""),
            config_with_salt("DEFAULT_SALT_REPLACE_IN_PRODUCTION"),
        ] {
            let engine = ConsistencyEngine::new(&config).unwrap();
            assert!(matches!(engine.salt_warning(), Some(DeidError::WeakSalt(_))));
        }

        let missing = ConsistencyEngine::new(&SecurityConfig::default()).unwrap();
        let placeholder = ConsistencyEngine::new(&config_with_salt(INSECURE_DEFAULT_SALT)).unwrap();
        let key = ConsistencyKey::new(PhiCategory::Mrn, "1");
        assert_eq!(missing.token(&key), placeholder.token(&key));
    }

    #[test]
    fn test_token_length_floor() {
        let mut config = config_with_salt("x");
        config.token_length = 3;
        let engine = ConsistencyEngine::new(&config).unwrap();
        assert_eq!(engine.token(&ConsistencyKey::new(PhiCategory::Mrn, "1")).len(), 8);
    }

    #[test]
    fn test_per_subject_shift_survives_extreme_bounds() {
        let config = SecurityConfig {
            date_shift_mode: DateShiftModeConfig::PerSubject,
            date_shift_min_days: i64::MIN,
            date_shift_max_days: i64::MAX,
            ..config_with_salt("salty")
        };
        let engine = ConsistencyEngine::new(&config).unwrap();
        let subject = SubjectId::new("patient-17").unwrap();
        let days = engine.date_shift_days(Some(&subject));
        assert_eq!(days, engine.date_shift_days(Some(&subject)));
    }

    #[test]
    fn test_per_subject_shift_is_stable_and_bounded() {
        let config = SecurityConfig {
            date_shift_mode: DateShiftModeConfig::PerSubject,
            ..config_with_salt("salty")
        };
        let engine = ConsistencyEngine::new(&config).unwrap();
        let subject = SubjectId::new("patient-17").unwrap();

        let first = engine.date_shift_days(Some(&subject));
        assert_eq!(first, engine.date_shift_days(Some(&subject)));
        assert!((30..=90).contains(&first));
        assert_eq!(engine.date_shift_days(None), 30);
    }

    #[test]
    fn test_session_caches_and_uses_registry() {
        let registry = Arc::new(InMemoryRegistry::new());
        let engine = ConsistencyEngine::new(&config_with_salt("k"))
            .unwrap()
            .with_registry(registry.clone());

        let mut session = engine.session(None);
        let a = session.token_for(PhiCategory::Name, "Jane Doe").unwrap();
        let b = session.token_for(PhiCategory::Name, "Jane  Doe").unwrap();
        assert_eq!(a, b);
        assert_eq!(session.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            session.shift_date("01/15/2023"),
            DateShiftOutcome::Shifted("02/14/2023".to_string())
        );
    }

    #[test]
    fn test_debug_hides_values() {
        let key = ConsistencyKey::new(PhiCategory::Name, "Jane Doe");
        assert!(!format!("{key:?}").contains("Jane"));
    }
}

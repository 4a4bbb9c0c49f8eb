//! Salt handling using the secrecy crate
//!
//! The token salt is the one value whose disclosure would let anyone rebuild
//! the PHI-to-token mapping by brute force, so it is held in a zeroizing
//! `Secret` and only exposed to the HMAC key schedule.
//!
//! # Example
//!
//! ```rust
//! use safeharbor::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let salt = secret_string("per-deployment-salt".to_string());
//! assert_eq!(salt.expose_secret().as_bytes(), b"per-deployment-salt");
//!
//! // Debug output is redacted
//! assert!(!format!("{salt:?}").contains("per-deployment"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Check if the secret value is empty or whitespace
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Raw bytes, for use as a MAC key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Type alias for a secret string
///
/// Zeroed on drop, redacted in Debug output, and only readable through
/// `expose_secret()`.
pub type SecretString = Secret<SecretValue>;

/// Helper function to create a SecretString from a String
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

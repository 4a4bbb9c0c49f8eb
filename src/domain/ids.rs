//! Domain identifier types with validation
//!
//! Newtype wrappers keep document identifiers (which appear in audit logs)
//! apart from subject identifiers (which seed per-patient date shifts and
//! must never be logged).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document identifier newtype wrapper
///
/// Identifies one clinical note within a run. Safe to log.
///
/// # Examples
///
/// ```
/// use safeharbor::domain::ids::DocumentId;
/// use std::str::FromStr;
///
/// let id = DocumentId::from_str("note-0001.txt").unwrap();
/// assert_eq!(id.as_str(), "note-0001.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new DocumentId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Document ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Generates a random document id for ad-hoc input such as stdin
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the document ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Subject (patient) identifier newtype wrapper
///
/// Seeds per-subject date shifting. The value is itself an identifier, so
/// `Debug` and `Display` never print it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a new SubjectId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Subject ID cannot be empty".to_string());
        }
        Ok(Self(id.trim().to_string()))
    }

    /// Returns the raw subject identifier
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubjectId([REDACTED])")
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl FromStr for SubjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

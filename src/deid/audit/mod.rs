//! Audit logging module
//!
//! Provides a structured audit trail of de-identification runs. Entries
//! carry offsets, categories and strategies; matched values are never
//! written.

pub mod logger;

pub use logger::AuditLogger;

//! Logging and observability
//!
//! Structured logging with configurable levels and optional rotating JSON
//! files. Log events carry offsets, categories, counts and provider names,
//! never matched text.
//!
//! # Example
//!
//! ```no_run
//! use safeharbor::logging::init_logging;
//! use safeharbor::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(documents = 3, "Batch started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of processing for one document
///
/// # Example
///
/// ```no_run
/// use safeharbor::log_document_start;
/// use safeharbor::domain::DocumentId;
///
/// let id = DocumentId::new("note-1.txt").unwrap();
/// log_document_start!(&id, 1024);
/// ```
#[macro_export]
macro_rules! log_document_start {
    ($document_id:expr, $bytes:expr) => {
        tracing::debug!(
            document_id = %$document_id,
            bytes = $bytes,
            "Starting de-identification"
        );
    };
}

/// Log the completion of one document
///
/// # Example
///
/// ```no_run
/// use safeharbor::log_document_complete;
/// use safeharbor::domain::DocumentId;
/// use std::time::Duration;
///
/// let id = DocumentId::new("note-1.txt").unwrap();
/// log_document_complete!(&id, 4, Duration::from_millis(12));
/// ```
#[macro_export]
macro_rules! log_document_complete {
    ($document_id:expr, $entities:expr, $duration:expr) => {
        tracing::info!(
            document_id = %$document_id,
            entities = $entities,
            duration_ms = $duration.as_millis() as u64,
            "De-identification completed"
        );
    };
}

/// Log a detector provider that failed or produced a bad span
///
/// # Example
///
/// ```no_run
/// use safeharbor::log_provider_failure;
///
/// log_provider_failure!("ner-service", "connection refused");
/// ```
#[macro_export]
macro_rules! log_provider_failure {
    ($provider:expr, $reason:expr) => {
        tracing::warn!(
            provider = %$provider,
            reason = %$reason,
            "Detector provider failure"
        );
    };
}

//! De-identification pipeline
//!
//! Detects the 18 HIPAA Safe Harbor identifier types in free text and
//! replaces them under a per-category strategy, consistently across
//! documents.
//!
//! # Architecture
//!
//! The pipeline consists of:
//! - **Detection**: independent providers (built-in rules, precomputed spans)
//!   run over an optionally normalized copy of the text
//! - **Resolution**: overlapping detections are merged or trimmed into a
//!   non-overlapping, sorted entity list
//! - **Consistency**: salted keyed tokens and date shifts, stable across
//!   documents and runs
//! - **Transformation**: redact, hash, pseudonym, generalize, date_shift or
//!   preserve, applied in one pass over original offsets
//! - **Audit**: one record per entity, free of matched text
//!
//! # Usage
//!
//! ```rust,no_run
//! use safeharbor::config::DeidConfig;
//! use safeharbor::deid::DeidEngine;
//!
//! # fn example() -> anyhow::Result<()> {
//! let engine = DeidEngine::new(DeidConfig::default())?;
//! let document = engine.deidentify("DOB: 01/15/1980")?;
//! assert_eq!(document.entities.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod compliance;
pub mod consistency;
pub mod detector;
pub mod engine;
pub mod evaluate;
pub mod models;
pub mod normalize;
pub mod report;
pub mod resolver;
pub mod transform;

// Re-export main types
pub use engine::{BatchOutcome, DeidEngine, DocumentRequest};
pub use evaluate::{Evaluation, EvaluationReport, GoldSpan};
pub use models::{DeidentifiedDocument, MergedEntity, PhiCategory, RawDetection};
pub use report::BatchReport;
pub use transform::{AuditRecord, Strategy};

// SafeHarbor - HIPAA Safe Harbor de-identification
// Copyright (c) 2025 SafeHarbor Contributors
// Licensed under the MIT License

//! # SafeHarbor - HIPAA Safe Harbor de-identification
//!
//! SafeHarbor removes protected health information from free-text clinical
//! notes so the text can be shared for research.
//!
//! ## Overview
//!
//! This library provides:
//! - **Detection** of the 18 Safe Harbor identifier types by an ensemble of
//!   independent providers
//! - **Resolution** of overlapping detections into one non-overlapping,
//!   sorted entity list with offsets into the original text
//! - **Transformation** under per-category strategies (redact, hash,
//!   pseudonym, generalize, date_shift, preserve)
//! - **Consistency**: the same value gets the same token in every document,
//!   and dates of one subject shift by the same offset
//! - **Audit** records of every replacement that never contain the original
//!   value
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`deid`] - The de-identification pipeline
//! - [`domain`] - Error taxonomy and identifiers
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use safeharbor::config::load_or_default;
//! use safeharbor::deid::DeidEngine;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = load_or_default(None)?;
//! let engine = DeidEngine::new(config)?;
//!
//! let document = engine.deidentify("Patient: John Smith, MRN: 123456789, DOB: 01/15/1980")?;
//! // Patient: PERSON_<code>, MRN: MRN_<code>, DOB: 02/14/1980
//! println!("{}", document.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Processing
//!
//! Documents run in parallel on blocking tasks; one failing document is
//! recorded in the report without stopping the others:
//!
//! ```rust,no_run
//! use safeharbor::config::DeidConfig;
//! use safeharbor::deid::{DeidEngine, DocumentRequest};
//! use safeharbor::domain::DocumentId;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Arc::new(DeidEngine::new(DeidConfig::default())?);
//! let requests = vec![
//!     DocumentRequest::new(DocumentId::new("note-1").map_err(anyhow::Error::msg)?, "MRN: 4455667"),
//!     DocumentRequest::new(DocumentId::new("note-2").map_err(anyhow::Error::msg)?, "MRN: 4455667"),
//! ];
//!
//! let outcome = engine.deidentify_batch(requests, 4).await;
//! assert_eq!(outcome.documents[0].text, outcome.documents[1].text);
//! println!("{}", outcome.report.format_console());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Core operations return [`domain::DeidError`]; the engine and the CLI wrap
//! them in `anyhow` with context.

pub mod cli;
pub mod config;
pub mod deid;
pub mod domain;
pub mod logging;

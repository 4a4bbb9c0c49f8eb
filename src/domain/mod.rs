//! Domain types for SafeHarbor.
//!
//! This module contains the error taxonomy, the crate-wide [`Result`] alias,
//! and the strongly-typed identifiers shared by the pipeline and the CLI.
//!
//! # Error Handling
//!
//! All fallible core operations return [`Result<T, DeidError>`]:
//!
//! ```rust
//! use safeharbor::domain::{DeidError, Result};
//!
//! fn check_threshold(value: f64) -> Result<()> {
//!     if !(0.0..=1.0).contains(&value) {
//!         return Err(DeidError::Configuration(format!("threshold {value} out of range")));
//!     }
//!     Ok(())
//! }
//! # check_threshold(0.5).unwrap();
//! ```

pub mod errors;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::DeidError;
pub use ids::{DocumentId, SubjectId};
pub use result::Result;

//! PHI entity data models

pub mod category;
pub mod detection;
pub mod document;

pub use category::PhiCategory;
pub use detection::{MergedEntity, RawDetection};
pub use document::DeidentifiedDocument;

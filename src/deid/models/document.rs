//! De-identified document model

use super::PhiCategory;
use crate::deid::transform::{AuditRecord, Strategy};
use crate::domain::ids::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of de-identifying one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeidentifiedDocument {
    pub document_id: DocumentId,
    /// Transformed text, or the original text in dry-run mode
    pub text: String,
    /// One record per resolved entity, in start order
    pub entities: Vec<AuditRecord>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Entity count per category label
    pub stats_by_category: BTreeMap<PhiCategory, usize>,
    pub dry_run: bool,
    /// Provider failures and dropped detections
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DeidentifiedDocument {
    pub fn new(
        document_id: DocumentId,
        text: String,
        entities: Vec<AuditRecord>,
        processing_time_ms: u64,
        dry_run: bool,
    ) -> Self {
        let mut stats_by_category = BTreeMap::new();
        for record in &entities {
            *stats_by_category.entry(record.category).or_insert(0) += 1;
        }

        Self {
            document_id,
            text,
            entities,
            processing_time_ms,
            timestamp: Utc::now(),
            stats_by_category,
            dry_run,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Get total number of entities
    pub fn total_entities(&self) -> usize {
        self.entities.len()
    }

    /// Check if any PHI was found
    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }

    /// Entity count per applied strategy
    pub fn stats_by_strategy(&self) -> BTreeMap<Strategy, usize> {
        let mut stats = BTreeMap::new();
        for record in &self.entities {
            *stats.entry(record.strategy_applied).or_insert(0) += 1;
        }
        stats
    }
}

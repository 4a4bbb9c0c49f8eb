//! Batch reporting
//!
//! Aggregates per-document results into entity counts by category and
//! strategy, timing statistics, failures and warnings.

use crate::deid::models::{DeidentifiedDocument, PhiCategory};
use crate::deid::transform::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Whether documents were only analyzed
    pub dry_run: bool,

    /// Documents processed successfully
    pub total_documents: usize,

    /// Total PHI entities across successful documents
    pub total_entities: usize,

    /// Entities by category
    pub entities_by_category: BTreeMap<PhiCategory, usize>,

    /// Entities by applied strategy
    pub entities_by_strategy: BTreeMap<Strategy, usize>,

    /// Documents that could not be processed
    pub failures: Vec<DocumentFailure>,

    /// Provider failures, dropped detections and configuration warnings
    pub warnings: Vec<String>,

    /// Processing statistics
    pub stats: ProcessingStats,
}

/// One document that failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub error: String,
}

/// Processing statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Average processing time per document (ms)
    pub avg_processing_time_ms: u64,

    /// Total processing time (ms)
    pub total_processing_time_ms: u64,

    /// Documents with PHI found
    pub documents_with_phi: usize,

    /// Documents without PHI
    pub documents_without_phi: usize,
}

impl BatchReport {
    /// Create a new empty report
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            total_documents: 0,
            total_entities: 0,
            entities_by_category: BTreeMap::new(),
            entities_by_strategy: BTreeMap::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            stats: ProcessingStats::default(),
        }
    }

    /// Add results from a processed document
    pub fn add_document(&mut self, document: &DeidentifiedDocument) {
        self.total_documents += 1;
        self.stats.total_processing_time_ms += document.processing_time_ms;

        if document.entities.is_empty() {
            self.stats.documents_without_phi += 1;
        } else {
            self.stats.documents_with_phi += 1;
            self.total_entities += document.entities.len();

            for (category, count) in &document.stats_by_category {
                *self.entities_by_category.entry(*category).or_insert(0) += count;
            }
            for (strategy, count) in document.stats_by_strategy() {
                *self.entities_by_strategy.entry(strategy).or_insert(0) += count;
            }
        }

        for warning in &document.warnings {
            self.warnings
                .push(format!("{}: {warning}", document.document_id));
        }

        self.stats.avg_processing_time_ms =
            self.stats.total_processing_time_ms / self.total_documents as u64;
    }

    /// Record a document that failed
    pub fn add_failure(&mut self, document_id: impl Into<String>, error: impl Into<String>) {
        self.failures.push(DocumentFailure {
            document_id: document_id.into(),
            error: error.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Format report for console output
    pub fn format_console(&self) -> String {
        let mut output = String::new();
        let rule = "───────────────────────────────────────────────────────────────\n";

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        if self.dry_run {
            output.push_str("               DE-IDENTIFICATION DRY-RUN REPORT                \n");
        } else {
            output.push_str("                  DE-IDENTIFICATION REPORT                     \n");
        }
        output.push_str("═══════════════════════════════════════════════════════════════\n\n");

        output.push_str("📊 SUMMARY\n");
        output.push_str(rule);
        output.push_str(&format!(
            "  Documents Processed:         {}\n",
            self.total_documents
        ));
        output.push_str(&format!(
            "  Documents with PHI:          {}\n",
            self.stats.documents_with_phi
        ));
        output.push_str(&format!(
            "  Documents without PHI:       {}\n",
            self.stats.documents_without_phi
        ));
        output.push_str(&format!(
            "  Documents Failed:            {}\n",
            self.failures.len()
        ));
        output.push_str(&format!(
            "  Total PHI Entities:          {}\n",
            self.total_entities
        ));
        output.push_str(&format!(
            "  Avg Processing Time:         {} ms\n\n",
            self.stats.avg_processing_time_ms
        ));

        if !self.entities_by_category.is_empty() {
            output.push_str("🔍 ENTITIES BY CATEGORY\n");
            output.push_str(rule);

            let mut categories: Vec<_> = self.entities_by_category.iter().collect();
            categories.sort_by(|a, b| b.1.cmp(a.1));
            for (category, count) in categories {
                output.push_str(&format!("  {:30} {:>5}\n", category.label(), count));
            }
            output.push('\n');
        }

        if !self.entities_by_strategy.is_empty() {
            output.push_str("🔧 ENTITIES BY STRATEGY\n");
            output.push_str(rule);
            for (strategy, count) in &self.entities_by_strategy {
                output.push_str(&format!("  {:30} {:>5}\n", strategy.as_str(), count));
            }
            output.push('\n');
        }

        if !self.failures.is_empty() {
            output.push_str("❌ FAILURES\n");
            output.push_str(rule);
            for failure in &self.failures {
                output.push_str(&format!("  • {}: {}\n", failure.document_id, failure.error));
            }
            output.push('\n');
        }

        if !self.warnings.is_empty() {
            output.push_str("⚠️  WARNINGS\n");
            output.push_str(rule);
            for warning in &self.warnings {
                output.push_str(&format!("  • {warning}\n"));
            }
            output.push('\n');
        }

        output.push_str("═══════════════════════════════════════════════════════════════\n\n");
        output
    }

    /// Format report as JSON
    pub fn format_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write report to file
    pub fn write_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self.format_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new(false)
    }
}

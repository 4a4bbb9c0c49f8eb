//! Audit logger for de-identification runs

use crate::deid::models::DeidentifiedDocument;
use crate::deid::transform::AuditRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Audit log entry
#[derive(Debug, Serialize)]
struct AuditLogEntry<'a> {
    timestamp: String,
    document_id: &'a str,
    entity_count: usize,
    dry_run: bool,
    processing_time_ms: u64,
    by_category: BTreeMap<&'static str, usize>,
    entities: Vec<AuditEntity<'a>>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
}

/// Audit entity entry. Offsets, category and outcome only; never the value.
#[derive(Debug, Serialize)]
struct AuditEntity<'a> {
    start: usize,
    end: usize,
    category: &'static str,
    confidence: f64,
    strategy: &'static str,
    strategy_applied: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    replacement: Option<&'a str>,
    sources: &'a [String],
}

impl<'a> From<&'a AuditRecord> for AuditEntity<'a> {
    fn from(record: &'a AuditRecord) -> Self {
        Self {
            start: record.start,
            end: record.end,
            category: record.category.label(),
            confidence: record.confidence,
            strategy: record.strategy.as_str(),
            strategy_applied: record.strategy_applied.as_str(),
            replacement: record.replacement.as_deref(),
            sources: &record.sources,
        }
    }
}

/// Appends one entry per processed document
pub struct AuditLogger {
    log_path: PathBuf,
    json_format: bool,
    enabled: bool,
    // Serializes appends from concurrent batch tasks
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(log_path: PathBuf, json_format: bool, enabled: bool) -> Result<Self> {
        if enabled {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create audit log directory: {}", parent.display())
                })?;
            }
        }

        Ok(Self {
            log_path,
            json_format,
            enabled,
            write_lock: Mutex::new(()),
        })
    }

    /// A logger that writes nothing
    pub fn disabled() -> Self {
        Self {
            log_path: PathBuf::new(),
            json_format: true,
            enabled: false,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a de-identified document
    pub fn log_document(&self, document: &DeidentifiedDocument) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = AuditLogEntry {
            timestamp: document.timestamp.to_rfc3339(),
            document_id: document.document_id.as_str(),
            entity_count: document.entities.len(),
            dry_run: document.dry_run,
            processing_time_ms: document.processing_time_ms,
            by_category: document
                .stats_by_category
                .iter()
                .map(|(category, count)| (category.label(), *count))
                .collect(),
            entities: document.entities.iter().map(AuditEntity::from).collect(),
            warnings: &document.warnings,
        };

        self.write_entry(&entry)
    }

    /// Write an audit entry to the log file
    fn write_entry(&self, entry: &AuditLogEntry<'_>) -> Result<()> {
        let line = if self.json_format {
            serde_json::to_string(entry).context("Failed to serialize audit entry")?
        } else {
            let categories: Vec<String> = entry
                .by_category
                .iter()
                .map(|(label, count)| format!("{label}={count}"))
                .collect();
            format!(
                "[{}] Document: {} | Entities: {} | Categories: {} | Dry run: {} | Time: {}ms",
                entry.timestamp,
                entry.document_id,
                entry.entity_count,
                categories.join(","),
                entry.dry_run,
                entry.processing_time_ms
            )
        };

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open audit log: {}", self.log_path.display()))?;
        writeln!(file, "{line}").context("Failed to write audit entry")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::models::PhiCategory;
    use crate::deid::transform::Strategy;
    use crate::domain::ids::DocumentId;
    use tempfile::tempdir;

    fn document() -> DeidentifiedDocument {
        let record = AuditRecord {
            start: 9,
            end: 19,
            category: PhiCategory::Name,
            confidence: 0.9,
            strategy: Strategy::Pseudonym,
            strategy_applied: Strategy::Pseudonym,
            replacement: Some("PERSON_1a2b3c4d".to_string()),
            sources: vec!["regex".to_string()],
            original_text: Some("John Smith".to_string()),
        };
        DeidentifiedDocument::new(
            DocumentId::new("note-123").unwrap(),
            "Patient: PERSON_1a2b3c4d".to_string(),
            vec![record],
            5,
            false,
        )
    }

    #[test]
    fn test_audit_logger_creation() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit").join("test_audit.log");

        let logger = AuditLogger::new(log_path.clone(), true, true).unwrap();
        assert!(logger.is_enabled());
        assert!(log_path.parent().unwrap().exists());
    }

    #[test]
    fn test_log_document_never_contains_original_text() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test_audit.log");
        let logger = AuditLogger::new(log_path.clone(), true, true).unwrap();

        logger.log_document(&document()).unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("note-123"));
        assert!(content.contains("PERSON_1a2b3c4d"));
        assert!(!content.contains("John Smith"));

        let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry["entity_count"], 1);
        assert_eq!(entry["entities"][0]["start"], 9);
        assert_eq!(entry["by_category"]["NAME"], 1);
    }

    #[test]
    fn test_plain_text_format() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test_audit.log");
        let logger = AuditLogger::new(log_path.clone(), false, true).unwrap();

        logger.log_document(&document()).unwrap();
        logger.log_document(&document()).unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Document: note-123 | Entities: 1 | Categories: NAME=1"));
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test_audit.log");
        let logger = AuditLogger::new(log_path.clone(), true, false).unwrap();
        logger.log_document(&document()).unwrap();
        assert!(!log_path.exists());
    }
}

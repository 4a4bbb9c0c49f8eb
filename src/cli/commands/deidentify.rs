//! Deidentify command implementation
//!
//! This module implements the `deidentify` command, which processes one
//! document read from a file or stdin.

use super::{engine_or_report, exit_code_for, load_or_report, EXIT_CONFIG, EXIT_OK};
use crate::deid::detector::precomputed::PrecomputedSpan;
use crate::deid::{DeidentifiedDocument, DocumentRequest};
use crate::domain::{DocumentId, SubjectId};
use anyhow::Context;
use clap::{Args, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Output rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Text plus per-entity records
    Json,
    /// Transformed text only
    Text,
}

/// Arguments for the deidentify command
#[derive(Args, Debug)]
pub struct DeidentifyArgs {
    /// Input file (reads stdin when omitted or `-`)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file (writes stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Subject identifier for per-subject date shifting
    #[arg(long)]
    pub subject_id: Option<String>,

    /// Document identifier (defaults to the input file name)
    #[arg(long)]
    pub document_id: Option<String>,

    /// JSON file of precomputed detections for this document
    #[arg(long, value_name = "JSON")]
    pub detections: Option<PathBuf>,

    /// Report what would be replaced without changing the text
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

impl DeidentifyArgs {
    /// Execute the deidentify command
    pub async fn execute(&self, config_path: Option<&Path>) -> anyhow::Result<i32> {
        tracing::info!("Starting deidentify command");

        let mut config = match load_or_report(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let engine = match engine_or_report(config) {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };

        let request = match self.build_request() {
            Ok(request) => request,
            Err(code) => return Ok(code),
        };

        let document = match engine.deidentify_document(&request) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(
                    document_id = %request.document_id,
                    error = %format!("{e:#}"),
                    "De-identification failed"
                );
                eprintln!("❌ {e:#}");
                return Ok(exit_code_for(&e));
            }
        };

        for warning in &document.warnings {
            eprintln!("⚠️  {warning}");
        }

        let rendered = render(&document, self.format)?;
        match self.output {
            Some(ref path) => std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write output: {}", path.display()))?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
        }

        Ok(EXIT_OK)
    }

    fn build_request(&self) -> Result<DocumentRequest, i32> {
        let text = read_input(self.input.as_deref()).map_err(|e| {
            eprintln!("❌ {e:#}");
            super::EXIT_FATAL
        })?;

        let document_id = match (&self.document_id, &self.input) {
            (Some(id), _) => DocumentId::new(id.clone()),
            (None, Some(path)) if path.as_os_str() != "-" => {
                match path.file_name().and_then(|name| name.to_str()) {
                    Some(name) => DocumentId::new(name),
                    None => Ok(DocumentId::generate()),
                }
            }
            _ => Ok(DocumentId::generate()),
        }
        .map_err(|e| {
            eprintln!("❌ Invalid document id: {e}");
            EXIT_CONFIG
        })?;

        let mut request = DocumentRequest::new(document_id, text);

        if let Some(ref subject) = self.subject_id {
            let subject = SubjectId::new(subject.clone()).map_err(|e| {
                eprintln!("❌ Invalid subject id: {e}");
                EXIT_CONFIG
            })?;
            request = request.with_subject(subject);
        }

        if let Some(ref path) = self.detections {
            let spans = read_detections(path).map_err(|e| {
                eprintln!("❌ {e:#}");
                super::EXIT_FATAL
            })?;
            request = request.with_detections(spans);
        }

        Ok(request)
    }
}

/// Reads a whole document from `path`, or stdin when absent or `-`
pub(crate) fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Reads a JSON array of precomputed spans
pub(crate) fn read_detections(path: &Path) -> anyhow::Result<Vec<PrecomputedSpan>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read detections: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse detections: {}", path.display()))
}

fn render(document: &DeidentifiedDocument, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(document)
                .context("Failed to serialize document")?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Text => Ok(document.text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::{PhiCategory, Strategy};
    use crate::deid::transform::AuditRecord;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn document() -> DeidentifiedDocument {
        DeidentifiedDocument::new(
            DocumentId::new("note.txt").unwrap(),
            "Call [REDACTED:PHONE_NUMBER]".to_string(),
            vec![AuditRecord {
                start: 5,
                end: 17,
                category: PhiCategory::PhoneNumber,
                confidence: 0.85,
                strategy: Strategy::Redact,
                strategy_applied: Strategy::Redact,
                replacement: Some("[REDACTED:PHONE_NUMBER]".to_string()),
                sources: vec!["regex".to_string()],
                original_text: None,
            }],
            1,
            false,
        )
    }

    #[test]
    fn test_render_json_contains_entities() {
        let json = render(&document(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["text"], "Call [REDACTED:PHONE_NUMBER]");
        assert_eq!(value["entities"][0]["start"], 5);
        assert_eq!(value["entities"][0]["strategy_applied"], "redact");
    }

    #[test]
    fn test_render_text_is_plain() {
        let text = render(&document(), OutputFormat::Text).unwrap();
        assert_eq!(text, "Call [REDACTED:PHONE_NUMBER]");
    }

    #[test]
    fn test_read_detections() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"start": 0, "end": 4, "category": "PERSON", "confidence": 0.7}}]"#
        )
        .unwrap();

        let spans = read_detections(file.path()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].category, "PERSON");
    }

    #[test]
    fn test_read_input_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "MRN: 123456").unwrap();
        assert_eq!(read_input(Some(file.path())).unwrap(), "MRN: 123456");
    }
}

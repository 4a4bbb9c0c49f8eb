//! Batch command implementation
//!
//! This module implements the `batch` command, which de-identifies every
//! note in a directory and writes a report.

use super::deidentify::read_detections;
use super::{engine_or_report, load_or_report, EXIT_OK, EXIT_PARTIAL};
use crate::deid::{DeidentifiedDocument, DocumentRequest};
use crate::domain::DocumentId;
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Suffix of the optional detections file next to a note: `note.txt` is
/// paired with `note.detections.json`
pub const DETECTIONS_SUFFIX: &str = ".detections.json";

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory of notes to de-identify
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Directory for de-identified notes and their entity records
    #[arg(long)]
    pub output_dir: PathBuf,

    /// File extension of notes to pick up
    #[arg(long, default_value = "txt")]
    pub extension: String,

    /// Documents processed in parallel
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Write the batch report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Report what would be replaced without writing any output
    #[arg(long)]
    pub dry_run: bool,
}

/// A note found in an input directory
#[derive(Debug)]
pub(crate) struct Note {
    pub(crate) path: PathBuf,
    pub(crate) document_id: String,
}

impl BatchArgs {
    /// Execute the batch command
    pub async fn execute(
        &self,
        config_path: Option<&Path>,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            "Starting batch command"
        );

        let mut config = match load_or_report(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let engine = match engine_or_report(config) {
            Ok(engine) => Arc::new(engine),
            Err(code) => return Ok(code),
        };

        let notes = discover_notes(&self.input_dir, &self.extension)?;
        if notes.is_empty() {
            println!(
                "No .{} files found in {}",
                self.extension,
                self.input_dir.display()
            );
            return Ok(EXIT_OK);
        }

        println!(
            "🔒 De-identifying {} documents from {}",
            notes.len(),
            self.input_dir.display()
        );

        let mut unreadable = Vec::new();
        let mut requests = Vec::with_capacity(notes.len());
        for note in notes {
            match load_request(&note) {
                Ok(request) => requests.push(request),
                Err(e) => unreadable.push((note.document_id, format!("{e:#}"))),
            }
        }

        let mut outcome = engine
            .deidentify_batch_until(requests, self.concurrency, shutdown_signal)
            .await;
        for (document_id, error) in unreadable {
            tracing::error!(document_id = %document_id, error = %error, "Failed to load note");
            outcome.report.add_failure(document_id, error);
        }

        if !engine.is_dry_run() {
            std::fs::create_dir_all(&self.output_dir).with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    self.output_dir.display()
                )
            })?;
            for document in &outcome.documents {
                if let Err(e) = write_document(&self.output_dir, document) {
                    tracing::error!(
                        document_id = %document.document_id,
                        error = %format!("{e:#}"),
                        "Failed to write output"
                    );
                    outcome
                        .report
                        .add_failure(document.document_id.as_str(), format!("{e:#}"));
                }
            }
        }

        println!("{}", outcome.report.format_console());

        if let Some(ref path) = self.report {
            outcome
                .report
                .write_to_file(path)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("📄 Report written to {}", path.display());
        }

        if outcome.report.has_failures() || outcome.skipped > 0 {
            Ok(EXIT_PARTIAL)
        } else {
            Ok(EXIT_OK)
        }
    }
}

/// Notes with `extension` in `input_dir`, sorted by file name
pub(crate) fn discover_notes(input_dir: &Path, extension: &str) -> anyhow::Result<Vec<Note>> {
    let entries = std::fs::read_dir(input_dir).with_context(|| {
        format!("Failed to read input directory: {}", input_dir.display())
    })?;

    let extension = extension.trim_start_matches('.');
    let mut notes = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping file with non UTF-8 name");
            continue;
        };
        notes.push(Note {
            document_id: name.to_string(),
            path,
        });
    }

    notes.sort_by(|a, b| a.document_id.cmp(&b.document_id));
    Ok(notes)
}

/// Reads a note and its detections file, if there is one
pub(crate) fn load_request(note: &Note) -> anyhow::Result<DocumentRequest> {
    let text = std::fs::read_to_string(&note.path)
        .with_context(|| format!("Failed to read {}", note.path.display()))?;
    let document_id = DocumentId::new(note.document_id.clone()).map_err(anyhow::Error::msg)?;
    let mut request = DocumentRequest::new(document_id, text);

    let detections = sidecar_path(&note.path, DETECTIONS_SUFFIX);
    if detections.is_file() {
        request = request.with_detections(read_detections(&detections)?);
    }
    Ok(request)
}

/// `dir/note.txt` with `.detections.json` → `dir/note.detections.json`
pub(crate) fn sidecar_path(note: &Path, suffix: &str) -> PathBuf {
    let stem = note
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    note.with_file_name(format!("{stem}{suffix}"))
}

/// Writes `<id>` with the transformed text and `<id>.entities.json` with
/// its records
fn write_document(output_dir: &Path, document: &DeidentifiedDocument) -> anyhow::Result<()> {
    let text_path = output_dir.join(document.document_id.as_str());
    std::fs::write(&text_path, &document.text)
        .with_context(|| format!("Failed to write {}", text_path.display()))?;

    let records_path = output_dir.join(format!("{}.entities.json", document.document_id));
    let json = serde_json::to_string_pretty(&document.entities)?;
    std::fs::write(&records_path, json)
        .with_context(|| format!("Failed to write {}", records_path.display()))?;
    Ok(())
}

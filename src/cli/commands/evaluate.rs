//! Evaluate command implementation
//!
//! Runs detection over annotated notes and scores it per category. A note
//! `note.txt` is scored against `note.gold.json`, a JSON array of
//! `{"start", "end", "label"}` spans.

use super::batch::{discover_notes, load_request, sidecar_path, Note};
use super::{engine_or_report, load_or_report, EXIT_OK, EXIT_PARTIAL};
use crate::deid::evaluate::{Evaluation, GoldSpan, DEFAULT_IOU_THRESHOLD};
use crate::deid::DeidEngine;
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};

/// Suffix of the gold annotations next to a note
pub const GOLD_SUFFIX: &str = ".gold.json";

/// Arguments for the evaluate command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Note file, or directory of notes
    #[arg(short, long)]
    pub input: PathBuf,

    /// Gold annotations for a single note (defaults to the `.gold.json` file
    /// next to it)
    #[arg(short, long)]
    pub gold: Option<PathBuf>,

    /// File extension of notes to pick up from a directory
    #[arg(long, default_value = "txt")]
    pub extension: String,

    /// Overlap a detection needs with a gold span of the same category
    #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD)]
    pub iou_threshold: f64,

    /// Write the evaluation report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl EvaluateArgs {
    /// Execute the evaluate command
    pub async fn execute(&self, config_path: Option<&Path>) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Starting evaluate command");

        let mut evaluation = Evaluation::new(self.iou_threshold)?;

        let config = match load_or_report(config_path) {
            Ok(config) => config,
            Err(code) => return Ok(code),
        };
        let engine = match engine_or_report(config) {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };

        let pairs = self.annotated_notes()?;
        if pairs.is_empty() {
            println!("No annotated notes found in {}", self.input.display());
            return Ok(EXIT_OK);
        }

        let mut incomplete = false;
        for (note, gold_path) in &pairs {
            let Some(gold_path) = gold_path else {
                tracing::warn!(document_id = %note.document_id, "No gold annotations, skipping");
                evaluation.add_warning(format!("{}: no gold annotations", note.document_id));
                incomplete = true;
                continue;
            };
            if let Err(e) = score_note(&engine, &mut evaluation, note, gold_path) {
                tracing::error!(
                    document_id = %note.document_id,
                    error = %format!("{e:#}"),
                    "Failed to evaluate note"
                );
                evaluation.add_warning(format!("{}: {e:#}", note.document_id));
                incomplete = true;
            }
        }

        let report = evaluation.report();
        println!("{}", report.format_console());

        if let Some(ref path) = self.report {
            report
                .write_to_file(path)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("📄 Report written to {}", path.display());
        }

        Ok(if incomplete { EXIT_PARTIAL } else { EXIT_OK })
    }

    /// Notes to score, each with its gold file when one exists
    fn annotated_notes(&self) -> anyhow::Result<Vec<(Note, Option<PathBuf>)>> {
        if self.input.is_dir() {
            let notes = discover_notes(&self.input, &self.extension)?;
            return Ok(notes
                .into_iter()
                .map(|note| {
                    let gold = sidecar_path(&note.path, GOLD_SUFFIX);
                    let gold = gold.is_file().then_some(gold);
                    (note, gold)
                })
                .collect());
        }

        let document_id = self
            .input
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid note path: {}", self.input.display()))?
            .to_string();
        let gold = self
            .gold
            .clone()
            .unwrap_or_else(|| sidecar_path(&self.input, GOLD_SUFFIX));
        let gold = gold.is_file().then_some(gold);
        Ok(vec![(
            Note {
                path: self.input.clone(),
                document_id,
            },
            gold,
        )])
    }
}

fn score_note(
    engine: &DeidEngine,
    evaluation: &mut Evaluation,
    note: &Note,
    gold_path: &Path,
) -> anyhow::Result<()> {
    let gold = read_gold(gold_path)?;
    let request = load_request(note)?;
    let (entities, _) = engine.detect_document(&request)?;
    evaluation.add_document(&note.document_id, &gold, &entities);
    Ok(())
}

fn read_gold(path: &Path) -> anyhow::Result<Vec<GoldSpan>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read gold annotations: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse gold annotations: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(input: &Path) -> EvaluateArgs {
        EvaluateArgs {
            input: input.to_path_buf(),
            gold: None,
            extension: "txt".to_string(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            report: None,
        }
    }

    fn config(dir: &Path) -> PathBuf {
        let path = dir.join("safeharbor.toml");
        std::fs::write(&path, "[security]\nsalt = \"evaluate-test-salt\"\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_evaluate_directory_writes_report() {
        let input = TempDir::new().unwrap();
        std::fs::write(input.path().join("a.txt"), "Call 555-123-4567 now").unwrap();
        std::fs::write(
            input.path().join("a.gold.json"),
            r#"[{"start": 5, "end": 17, "label": "PHONE"}]"#,
        )
        .unwrap();

        let config_dir = TempDir::new().unwrap();
        let report_path = config_dir.path().join("eval.json");
        let mut args = args(input.path());
        args.report = Some(report_path.clone());

        let code = args
            .execute(Some(&config(config_dir.path())))
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["documents"], 1);
        assert_eq!(report["by_label"]["PHONE_NUMBER"]["true_positives"], 1);
        assert_eq!(report["overall"]["recall"], 1.0);
    }

    #[tokio::test]
    async fn test_note_without_gold_is_partial() {
        let input = TempDir::new().unwrap();
        std::fs::write(input.path().join("a.txt"), "Call 555-123-4567 now").unwrap();
        std::fs::write(input.path().join("a.gold.json"), "[]").unwrap();
        std::fs::write(input.path().join("b.txt"), "Nothing to see").unwrap();

        let config_dir = TempDir::new().unwrap();
        let code = args(input.path())
            .execute(Some(&config(config_dir.path())))
            .await
            .unwrap();
        assert_eq!(code, EXIT_PARTIAL);
    }

    #[test]
    fn test_single_note_uses_explicit_gold() {
        let input = TempDir::new().unwrap();
        let note = input.path().join("a.txt");
        let gold = input.path().join("labels.json");
        std::fs::write(&note, "x").unwrap();
        std::fs::write(&gold, "[]").unwrap();

        let mut args = args(&note);
        args.gold = Some(gold.clone());
        let pairs = args.annotated_notes().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.document_id, "a.txt");
        assert_eq!(pairs[0].1.as_deref(), Some(gold.as_path()));
    }

    #[test]
    fn test_malformed_gold_is_an_error() {
        let input = TempDir::new().unwrap();
        let gold = input.path().join("a.gold.json");
        std::fs::write(&gold, r#"{"start": 1}"#).unwrap();
        assert!(read_gold(&gold).is_err());
    }
}

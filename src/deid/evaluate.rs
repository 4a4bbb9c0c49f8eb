//! Detection quality against gold annotations
//!
//! Each predicted entity is matched to the first unmatched gold span of the
//! same category whose intersection over union reaches the threshold.
//! Unmatched predictions are false positives and unmatched gold spans false
//! negatives. Counts are kept per category and summed across documents.

use crate::deid::models::{MergedEntity, PhiCategory};
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overlap needed for a prediction to count as finding a gold span
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.2;

/// One annotated span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldSpan {
    pub start: usize,
    pub end: usize,
    /// Category label or vendor alias
    #[serde(alias = "category")]
    pub label: String,
}

/// Intersection over union of two half-open spans
pub fn iou(a: (usize, usize), b: (usize, usize)) -> f64 {
    let intersection = a.1.min(b.1).saturating_sub(a.0.max(b.0));
    let union = a.1.max(b.1) - a.0.min(b.0);
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Match counts for one category or overall
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl MatchCounts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn add(&mut self, other: MatchCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Counts plus the scores derived from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    #[serde(flatten)]
    pub counts: MatchCounts,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl From<MatchCounts> for LabelScore {
    fn from(counts: MatchCounts) -> Self {
        Self {
            counts,
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
        }
    }
}

/// Accumulates matches over documents
#[derive(Debug, Clone)]
pub struct Evaluation {
    iou_threshold: f64,
    documents: usize,
    by_label: BTreeMap<String, MatchCounts>,
    warnings: Vec<String>,
}

impl Evaluation {
    /// # Errors
    ///
    /// [`DeidError::Configuration`] unless `iou_threshold` is within (0, 1].
    pub fn new(iou_threshold: f64) -> Result<Self> {
        if !(iou_threshold > 0.0 && iou_threshold <= 1.0) {
            return Err(DeidError::Configuration(format!(
                "IoU threshold must be within (0, 1], got {iou_threshold}"
            )));
        }
        Ok(Self {
            iou_threshold,
            documents: 0,
            by_label: BTreeMap::new(),
            warnings: Vec::new(),
        })
    }

    pub fn iou_threshold(&self) -> f64 {
        self.iou_threshold
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    /// Scores one document and adds its counts to the totals
    pub fn add_document(
        &mut self,
        document_id: &str,
        gold: &[GoldSpan],
        predicted: &[MergedEntity],
    ) -> MatchCounts {
        let gold: Vec<(usize, usize, String)> = gold
            .iter()
            .map(|span| (span.start, span.end, self.canonical_label(document_id, &span.label)))
            .collect();

        let mut matched = vec![false; gold.len()];
        let mut document = MatchCounts::default();

        for entity in predicted {
            let label = entity.category.label();
            let hit = gold.iter().enumerate().position(|(idx, (start, end, gold_label))| {
                !matched[idx]
                    && gold_label == label
                    && iou((entity.start, entity.end), (*start, *end)) >= self.iou_threshold
            });

            let counts = self.by_label.entry(label.to_string()).or_default();
            match hit {
                Some(idx) => {
                    matched[idx] = true;
                    counts.true_positives += 1;
                    document.true_positives += 1;
                }
                None => {
                    counts.false_positives += 1;
                    document.false_positives += 1;
                }
            }
        }

        for ((_, _, label), found) in gold.iter().zip(&matched) {
            if !found {
                self.by_label.entry(label.clone()).or_default().false_negatives += 1;
                document.false_negatives += 1;
            }
        }

        self.documents += 1;
        tracing::debug!(
            document_id,
            true_positives = document.true_positives,
            false_positives = document.false_positives,
            false_negatives = document.false_negatives,
            "Scored document"
        );
        document
    }

    /// Records a document that could not be scored
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Counts summed over every category
    pub fn overall(&self) -> MatchCounts {
        let mut total = MatchCounts::default();
        for counts in self.by_label.values() {
            total.add(*counts);
        }
        total
    }

    pub fn counts(&self, label: &str) -> Option<MatchCounts> {
        self.by_label.get(label).copied()
    }

    pub fn report(&self) -> EvaluationReport {
        EvaluationReport {
            iou_threshold: self.iou_threshold,
            documents: self.documents,
            overall: self.overall().into(),
            by_label: self
                .by_label
                .iter()
                .map(|(label, counts)| (label.clone(), (*counts).into()))
                .collect(),
            warnings: self.warnings.clone(),
        }
    }

    /// Gold labels use the canonical category label when one is known
    fn canonical_label(&mut self, document_id: &str, label: &str) -> String {
        match label.parse::<PhiCategory>() {
            Ok(category) => category.label().to_string(),
            Err(_) => {
                let warning = format!("{document_id}: unknown gold label '{label}'");
                if !self.warnings.contains(&warning) {
                    tracing::warn!(document_id, label, "Unknown gold label");
                    self.warnings.push(warning);
                }
                label.trim().to_uppercase()
            }
        }
    }
}

/// Serializable scores of an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub iou_threshold: f64,
    pub documents: usize,
    pub overall: LabelScore,
    pub by_label: BTreeMap<String, LabelScore>,
    pub warnings: Vec<String>,
}

impl EvaluationReport {
    /// Format report for console output
    pub fn format_console(&self) -> String {
        let mut output = String::new();
        let rule = "───────────────────────────────────────────────────────────────\n";

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                   DETECTION EVALUATION                        \n");
        output.push_str("═══════════════════════════════════════════════════════════════\n\n");

        output.push_str("📊 SUMMARY\n");
        output.push_str(rule);
        output.push_str(&format!("  Documents Scored:            {}\n", self.documents));
        output.push_str(&format!("  IoU Threshold:               {}\n", self.iou_threshold));
        output.push_str(&format!(
            "  Precision:                   {:.3}\n",
            self.overall.precision
        ));
        output.push_str(&format!("  Recall:                      {:.3}\n", self.overall.recall));
        output.push_str(&format!("  F1:                          {:.3}\n\n", self.overall.f1));

        if !self.by_label.is_empty() {
            output.push_str("🔍 BY CATEGORY\n");
            output.push_str(rule);
            output.push_str(&format!(
                "  {:20} {:>5} {:>5} {:>5} {:>7} {:>7} {:>7}\n",
                "", "TP", "FP", "FN", "P", "R", "F1"
            ));
            for (label, score) in &self.by_label {
                output.push_str(&format!(
                    "  {:20} {:>5} {:>5} {:>5} {:>7.3} {:>7.3} {:>7.3}\n",
                    label,
                    score.counts.true_positives,
                    score.counts.false_positives,
                    score.counts.false_negatives,
                    score.precision,
                    score.recall,
                    score.f1
                ));
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
    pub fn format_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write report to file
    pub fn write_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self.format_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::models::RawDetection;

    fn gold(start: usize, end: usize, label: &str) -> GoldSpan {
        GoldSpan {
            start,
            end,
            label: label.to_string(),
        }
    }

    fn entity(text: &str, start: usize, end: usize, category: PhiCategory) -> MergedEntity {
        MergedEntity::from_detection(
            RawDetection::new(text, start, end, category, 0.9, "regex").unwrap(),
        )
    }

    #[test]
    fn test_iou() {
        assert_eq!(iou((0, 10), (0, 10)), 1.0);
        assert_eq!(iou((0, 10), (10, 20)), 0.0);
        assert_eq!(iou((0, 10), (5, 15)), 5.0 / 15.0);
        assert_eq!(iou((3, 3), (3, 3)), 0.0);
    }

    #[test]
    fn test_threshold_must_be_positive() {
        assert!(Evaluation::new(0.0).is_err());
        assert!(Evaluation::new(1.5).is_err());
        assert!(Evaluation::new(1.0).is_ok());
    }

    #[test]
    fn test_scores_one_document() {
        let text = "John Smith, MRN 123456, seen 01/02/2020";
        let mut evaluation = Evaluation::new(DEFAULT_IOU_THRESHOLD).unwrap();

        let counts = evaluation.add_document(
            "note-1",
            &[gold(0, 10, "PERSON"), gold(16, 22, "MRN"), gold(29, 39, "DATE")],
            &[
                // Partial name still overlaps enough
                entity(text, 5, 10, PhiCategory::Name),
                entity(text, 16, 22, PhiCategory::Mrn),
                // Right span, wrong category
                entity(text, 29, 39, PhiCategory::OtherId),
            ],
        );

        assert_eq!(
            counts,
            MatchCounts {
                true_positives: 2,
                false_positives: 1,
                false_negatives: 1,
            }
        );
        assert_eq!(evaluation.counts("NAME").unwrap().true_positives, 1);
        assert_eq!(evaluation.counts("DATE").unwrap().false_negatives, 1);
        assert_eq!(evaluation.counts("OTHER_ID").unwrap().false_positives, 1);
    }

    #[test]
    fn test_gold_span_is_matched_once() {
        let text = "Jane Doe";
        let mut evaluation = Evaluation::new(DEFAULT_IOU_THRESHOLD).unwrap();
        evaluation.add_document(
            "note-1",
            &[gold(0, 8, "NAME")],
            &[
                entity(text, 0, 4, PhiCategory::Name),
                entity(text, 5, 8, PhiCategory::Name),
            ],
        );
        let overall = evaluation.overall();
        assert_eq!(overall.true_positives, 1);
        assert_eq!(overall.false_positives, 1);
        assert_eq!(overall.precision(), 0.5);
        assert_eq!(overall.recall(), 1.0);
    }

    #[test]
    fn test_counts_accumulate_across_documents() {
        let text = "555-123-4567";
        let mut evaluation = Evaluation::new(0.5).unwrap();
        evaluation.add_document(
            "a",
            &[gold(0, 12, "PHONE")],
            &[entity(text, 0, 12, PhiCategory::PhoneNumber)],
        );
        evaluation.add_document("b", &[gold(0, 12, "PHONE_NUMBER")], &[]);

        let report = evaluation.report();
        assert_eq!(report.documents, 2);
        let phone = &report.by_label["PHONE_NUMBER"];
        assert_eq!(phone.counts.true_positives, 1);
        assert_eq!(phone.counts.false_negatives, 1);
        assert_eq!(phone.precision, 1.0);
        assert_eq!(phone.recall, 0.5);
        assert!((phone.f1 - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_gold_label_is_reported_once() {
        let mut evaluation = Evaluation::new(DEFAULT_IOU_THRESHOLD).unwrap();
        evaluation.add_document("a", &[gold(0, 3, "weekday"), gold(4, 7, "weekday")], &[]);

        let report = evaluation.report();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.by_label["WEEKDAY"].counts.false_negatives, 2);
    }

    #[test]
    fn test_empty_evaluation_scores_zero() {
        let evaluation = Evaluation::new(DEFAULT_IOU_THRESHOLD).unwrap();
        let report = evaluation.report();
        assert_eq!(report.overall.f1, 0.0);
        assert!(report.format_console().contains("Documents Scored:            0"));
    }

    #[test]
    fn test_report_json_flattens_counts() {
        let text = "MRN 1234567";
        let mut evaluation = Evaluation::new(DEFAULT_IOU_THRESHOLD).unwrap();
        evaluation.add_document(
            "a",
            &[gold(4, 11, "MRN")],
            &[entity(text, 4, 11, PhiCategory::Mrn)],
        );

        let json: serde_json::Value =
            serde_json::from_str(&evaluation.report().format_json().unwrap()).unwrap();
        assert_eq!(json["overall"]["true_positives"], 1);
        assert_eq!(json["by_label"]["MRN"]["f1"], 1.0);
        assert_eq!(json["iou_threshold"], 0.2);
    }

    #[test]
    fn test_gold_span_accepts_category_alias() {
        let spans: Vec<GoldSpan> =
            serde_json::from_str(r#"[{"start": 0, "end": 4, "category": "DATE"}]"#).unwrap();
        assert_eq!(spans[0].label, "DATE");
    }
}

//! Detections computed elsewhere (an NER service, an annotation tool) and
//! supplied as JSON

use super::{DetectorProvider, ProviderKind};
use crate::deid::models::{PhiCategory, RawDetection};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One externally produced span
///
/// ```json
/// {"start": 9, "end": 19, "category": "PERSON", "confidence": 0.82, "source": "ner"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedSpan {
    pub start: usize,
    pub end: usize,
    /// Category label or vendor alias
    pub category: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Overrides the provider name as the detection source
    #[serde(default)]
    pub source: Option<String>,
    /// When present, must equal the input slice
    #[serde(default)]
    pub text: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

/// Replays a fixed list of spans against the text it is given
///
/// Spans are not validated here; the ensemble checks each one against the
/// input and drops the malformed ones individually.
pub struct PrecomputedDetector {
    name: String,
    kind: ProviderKind,
    spans: Vec<PrecomputedSpan>,
}

impl PrecomputedDetector {
    pub fn new(name: impl Into<String>, spans: Vec<PrecomputedSpan>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Model,
            spans,
        }
    }

    /// Parses a JSON array of spans
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let spans: Vec<PrecomputedSpan> =
            serde_json::from_str(json).context("Failed to parse precomputed detections JSON")?;
        Ok(Self::new(name, spans))
    }

    /// Reads a JSON array of spans from a file
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read precomputed detections: {}", path.display())
        })?;
        Self::from_json(name, &json)
    }

    /// Declares the spans as rule output instead of model output
    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

impl DetectorProvider for PrecomputedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn detect(&self, text: &str) -> Result<Vec<RawDetection>> {
        let mut detections = Vec::with_capacity(self.spans.len());

        for span in &self.spans {
            let category: PhiCategory = match span.category.parse() {
                Ok(category) => category,
                Err(e) => {
                    tracing::warn!(
                        provider = %self.name,
                        start = span.start,
                        end = span.end,
                        error = %e,
                        "Skipping precomputed span with unknown category"
                    );
                    continue;
                }
            };

            let text_at_span = match (&span.text, text.get(span.start..span.end)) {
                (Some(claimed), _) => claimed.clone(),
                (None, Some(slice)) => slice.to_string(),
                // Left empty so validation reports the bad offsets
                (None, None) => String::new(),
            };

            detections.push(RawDetection {
                start: span.start,
                end: span.end,
                category,
                confidence: span.confidence,
                source: span.source.clone().unwrap_or_else(|| self.name.clone()),
                text: text_at_span,
            });
        }

        Ok(detections)
    }
}

//! Detected spans before and after overlap resolution
//!
//! Offsets are byte offsets into the UTF-8 input and always fall on
//! character boundaries. Spans are half-open.

use super::PhiCategory;
use crate::domain::errors::DeidError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One span reported by one detector provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// PHI category
    pub category: PhiCategory,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    /// Name of the provider that produced the span
    pub source: String,
    /// Matched text, equal to `input[start..end]`
    pub text: String,
}

impl RawDetection {
    /// Builds a detection over `input`, copying the matched text
    ///
    /// # Errors
    ///
    /// Returns [`DeidError::MalformedDetection`] naming `source` when the span
    /// is empty, out of bounds, splits a character, or the confidence is not
    /// a finite value in `[0, 1]`.
    pub fn new(
        input: &str,
        start: usize,
        end: usize,
        category: PhiCategory,
        confidence: f64,
        source: impl Into<String>,
    ) -> Result<Self, DeidError> {
        let source = source.into();
        check_span(input, start, end).map_err(|reason| DeidError::malformed(&source, reason))?;
        check_confidence(confidence).map_err(|reason| DeidError::malformed(&source, reason))?;

        Ok(Self {
            start,
            end,
            category,
            confidence,
            text: input[start..end].to_string(),
            source,
        })
    }

    /// Re-checks a detection built elsewhere (deserialized, or produced by a
    /// third-party provider) against the input it claims to describe
    pub fn validate_against(&self, input: &str) -> Result<(), DeidError> {
        check_span(input, self.start, self.end)
            .and_then(|_| check_confidence(self.confidence))
            .and_then(|_| {
                if input[self.start..self.end] == self.text {
                    Ok(())
                } else {
                    Err(format!(
                        "stored text does not match input at {}..{}",
                        self.start, self.end
                    ))
                }
            })
            .map_err(|reason| DeidError::malformed(&self.source, reason))
    }

    /// Span length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always false for a validated detection
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Bytes shared with another span
    pub fn overlap_len(&self, other: &RawDetection) -> usize {
        let lo = self.start.max(other.start);
        let hi = self.end.min(other.end);
        hi.saturating_sub(lo)
    }

    /// Orders by start, then end, then descending confidence
    pub fn position_cmp(&self, other: &RawDetection) -> Ordering {
        self.start
            .cmp(&other.start)
            .then(self.end.cmp(&other.end))
            .then(other.confidence.total_cmp(&self.confidence))
    }
}

impl PartialOrd for RawDetection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.position_cmp(other))
    }
}

fn check_span(input: &str, start: usize, end: usize) -> Result<(), String> {
    if start >= end {
        return Err(format!("span {start}..{end} is empty or reversed"));
    }
    if end > input.len() {
        return Err(format!(
            "span {start}..{end} exceeds input length {}",
            input.len()
        ));
    }
    if !input.is_char_boundary(start) || !input.is_char_boundary(end) {
        return Err(format!("span {start}..{end} splits a UTF-8 character"));
    }
    Ok(())
}

fn check_confidence(confidence: f64) -> Result<(), String> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(format!("confidence {confidence} outside [0, 1]"));
    }
    Ok(())
}

/// A resolved entity: the winning span plus every provider that contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEntity {
    pub start: usize,
    pub end: usize,
    pub category: PhiCategory,
    pub confidence: f64,
    /// Source of the top-ranked member
    pub source: String,
    pub text: String,
    /// Contributing sources in rank order, without duplicates
    pub merged_from: Vec<String>,
    /// Set once the entity is part of a resolved, non-overlapping list
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl MergedEntity {
    /// Wraps a single detection that overlapped nothing
    pub fn from_detection(detection: RawDetection) -> Self {
        Self {
            start: detection.start,
            end: detection.end,
            category: detection.category,
            confidence: detection.confidence,
            merged_from: vec![detection.source.clone()],
            source: detection.source,
            text: detection.text,
            is_final: false,
        }
    }

    /// Span length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Records a contributing source unless it is already listed
    pub fn add_source(&mut self, source: &str) {
        if !self.merged_from.iter().any(|s| s == source) {
            self.merged_from.push(source.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_copies_text() {
        let d = RawDetection::new("Call 555-1234 now", 5, 13, PhiCategory::PhoneNumber, 0.9, "regex")
            .unwrap();
        assert_eq!(d.text, "555-1234");
        assert_eq!(d.len(), 8);
    }

    #[test]
    fn test_rejects_out_of_bounds() {
        let err = RawDetection::new("short", 2, 50, PhiCategory::Name, 0.9, "ner").unwrap_err();
        assert!(matches!(err, DeidError::MalformedDetection { ref provider, .. } if provider == "ner"));
    }

    #[test]
    fn test_rejects_empty_span() {
        assert!(RawDetection::new("text", 2, 2, PhiCategory::Name, 0.9, "ner").is_err());
    }

    #[test]
    fn test_rejects_split_character() {
        // "é" occupies bytes 3..5
        assert!(RawDetection::new("Renée", 0, 4, PhiCategory::Name, 0.9, "ner").is_err());
        assert!(RawDetection::new("Renée", 0, 6, PhiCategory::Name, 0.9, "ner").is_ok());
    }

    #[test]
    fn test_rejects_bad_confidence() {
        assert!(RawDetection::new("text", 0, 4, PhiCategory::Name, 1.5, "ner").is_err());
        assert!(RawDetection::new("text", 0, 4, PhiCategory::Name, f64::NAN, "ner").is_err());
    }

    #[test]
    fn test_validate_against_detects_text_mismatch() {
        let mut d = RawDetection::new("John Smith", 0, 4, PhiCategory::Name, 0.9, "ner").unwrap();
        assert!(d.validate_against("John Smith").is_ok());
        d.text = "Jane".to_string();
        assert!(d.validate_against("John Smith").is_err());
    }

    #[test]
    fn test_position_ordering() {
        let input = "John Smith";
        let a = RawDetection::new(input, 0, 4, PhiCategory::Name, 0.5, "a").unwrap();
        let b = RawDetection::new(input, 0, 4, PhiCategory::Name, 0.9, "b").unwrap();
        let c = RawDetection::new(input, 0, 10, PhiCategory::Name, 0.9, "c").unwrap();
        let mut all = vec![c.clone(), a.clone(), b.clone()];
        all.sort_by(|x, y| x.position_cmp(y));
        assert_eq!(all, vec![b, a, c]);
    }

    #[test]
    fn test_merged_entity_serializes_final_flag() {
        let d = RawDetection::new("John", 0, 4, PhiCategory::Name, 0.9, "ner").unwrap();
        let mut e = MergedEntity::from_detection(d);
        e.is_final = true;
        e.add_source("ner");
        e.add_source("regex");
        assert_eq!(e.merged_from, vec!["ner", "regex"]);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["final"], true);
    }
}

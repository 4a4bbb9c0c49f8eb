//! Regex-based PHI detector

use super::patterns::{PatternRegistry, PHI_GROUP};
use super::{DetectorProvider, ProviderKind};
use crate::deid::models::RawDetection;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Rule-based provider driven by a [`PatternRegistry`]
pub struct RegexDetector {
    name: String,
    pattern_registry: Arc<PatternRegistry>,
}

impl RegexDetector {
    /// Create a new regex detector with the built-in patterns
    pub fn new() -> Result<Self> {
        let registry = PatternRegistry::default_patterns()?;
        Ok(Self::with_registry(registry))
    }

    /// Create a detector from a pattern library file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_registry(PatternRegistry::from_file(path)?))
    }

    /// Create a new regex detector with custom pattern registry
    pub fn with_registry(registry: PatternRegistry) -> Self {
        Self {
            name: "regex".to_string(),
            pattern_registry: Arc::new(registry),
        }
    }

    /// Overrides the provider name reported as `source`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn detect_in_string(&self, text: &str) -> Result<Vec<RawDetection>> {
        // One entry per (span, category); the highest confidence wins
        let mut best: HashMap<(usize, usize, &'static str), RawDetection> = HashMap::new();

        for pattern in self.pattern_registry.all_patterns() {
            for capture in pattern.regex.captures_iter(text) {
                let Some(matched) = capture.name(PHI_GROUP).or_else(|| capture.get(0)) else {
                    continue;
                };
                if matched.as_str().trim().is_empty() {
                    continue;
                }

                let detection = RawDetection::new(
                    text,
                    matched.start(),
                    matched.end(),
                    pattern.category,
                    pattern.confidence,
                    self.name.as_str(),
                )?;

                let key = (detection.start, detection.end, pattern.category.label());
                match best.get(&key) {
                    Some(existing) if existing.confidence >= detection.confidence => {}
                    _ => {
                        best.insert(key, detection);
                    }
                }
            }
        }

        let mut entities: Vec<RawDetection> = best.into_values().collect();
        entities.sort_by(|a, b| a.position_cmp(b).then(a.category.cmp(&b.category)));
        Ok(entities)
    }
}

impl DetectorProvider for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RuleBased
    }

    fn detect(&self, text: &str) -> Result<Vec<RawDetection>> {
        self.detect_in_string(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::models::PhiCategory;

    fn find(entities: &[RawDetection], category: PhiCategory) -> Vec<&str> {
        entities
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.text.as_str())
            .collect()
    }

    #[test]
    fn test_detect_email() {
        let detector = RegexDetector::new().unwrap();
        let entities = detector.detect("Contact: john.doe@example.com").unwrap();
        assert_eq!(
            find(&entities, PhiCategory::EmailAddress),
            vec!["john.doe@example.com"]
        );
    }

    #[test]
    fn test_detect_phone() {
        let detector = RegexDetector::new().unwrap();
        let entities = detector.detect("Call (555) 123-4567 today").unwrap();
        assert_eq!(find(&entities, PhiCategory::PhoneNumber), vec!["(555) 123-4567"]);
    }

    #[test]
    fn test_header_scenario_yields_three_spans() {
        let detector = RegexDetector::new().unwrap();
        let entities = detector
            .detect("Patient: John Smith, MRN: 123456789, DOB: 01/15/1980")
            .unwrap();

        assert_eq!(entities.len(), 3);
        assert_eq!(find(&entities, PhiCategory::Name), vec!["John Smith"]);
        assert_eq!(find(&entities, PhiCategory::Mrn), vec!["123456789"]);
        assert_eq!(find(&entities, PhiCategory::Date), vec!["01/15/1980"]);
    }

    #[test]
    fn test_clinician_names() {
        let detector = RegexDetector::new().unwrap();
        let entities = detector.detect("Seen by Dr. Alice Jones in clinic.").unwrap();
        assert_eq!(find(&entities, PhiCategory::Name), vec!["Alice Jones"]);
    }

    #[test]
    fn test_fax_and_phone_both_reported() {
        let detector = RegexDetector::new().unwrap();
        let entities = detector.detect("Fax: 555-123-4567").unwrap();
        assert_eq!(find(&entities, PhiCategory::FaxNumber), vec!["555-123-4567"]);
        assert_eq!(find(&entities, PhiCategory::PhoneNumber), vec!["555-123-4567"]);
    }

    #[test]
    fn test_source_uses_detector_name() {
        let detector = RegexDetector::new().unwrap().with_name("rules-v2");
        let entities = detector.detect("SSN 123-45-6789").unwrap();
        assert!(entities.iter().all(|e| e.source == "rules-v2"));
        assert_eq!(detector.kind(), ProviderKind::RuleBased);
    }
}

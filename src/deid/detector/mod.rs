//! PHI detection
//!
//! Detection is delegated to [`DetectorProvider`] implementations. The
//! [`DetectorEnsemble`] runs every enabled provider independently, projects
//! their spans back onto the original text, and drops whatever a provider
//! got wrong without letting it affect the others.

pub mod patterns;
pub mod precomputed;
pub mod regex;

pub use self::precomputed::PrecomputedDetector;
pub use self::regex::RegexDetector;

use crate::config::{DetectConfig, ProviderConfig};
use crate::deid::models::RawDetection;
use crate::deid::normalize::TextNormalizer;
use crate::log_provider_failure;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// How a provider finds PHI; decides its default tie-break priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Patterns and rules
    RuleBased,
    /// Statistical or ML models, including remote services
    Model,
}

impl ProviderKind {
    /// Priority used when the configuration does not name one
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::RuleBased => 100,
            Self::Model => 50,
        }
    }
}

/// Capability implemented by every detector
pub trait DetectorProvider: Send + Sync {
    /// Stable identifier, used as the `source` of its detections
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Finds PHI spans in `text`. Offsets refer to `text` as given.
    fn detect(&self, text: &str) -> anyhow::Result<Vec<RawDetection>>;
}

struct RegisteredProvider {
    provider: Arc<dyn DetectorProvider>,
    priority: i32,
    enabled: bool,
}

/// Outcome of one ensemble pass over a document
#[derive(Debug, Clone, Default)]
pub struct DetectionRun {
    /// Valid detections with offsets into the original text
    pub detections: Vec<RawDetection>,
    /// One message per provider error or malformed detection
    pub warnings: Vec<String>,
}

/// Runs providers independently and collects their validated detections
pub struct DetectorEnsemble {
    providers: Vec<RegisteredProvider>,
    overrides: BTreeMap<String, ProviderConfig>,
    normalizer: Option<TextNormalizer>,
    min_confidence: f64,
    allowlist: Vec<String>,
}

impl DetectorEnsemble {
    /// An ensemble with no providers
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            overrides: BTreeMap::new(),
            normalizer: None,
            min_confidence: 0.0,
            allowlist: Vec::new(),
        }
    }

    /// Builds the ensemble described by `[detect]`, including the built-in
    /// rule detector when enabled
    pub fn from_config(config: &DetectConfig) -> anyhow::Result<Self> {
        let mut ensemble = Self {
            providers: Vec::new(),
            overrides: config.providers.clone(),
            normalizer: config.normalize_text.then(TextNormalizer::new),
            min_confidence: config.min_confidence,
            allowlist: config
                .allowlist
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
        };

        if config.enable_rules {
            let detector = match config.pattern_library {
                Some(ref path) => RegexDetector::from_file(path)?,
                None => RegexDetector::new()?,
            };
            ensemble.add_provider(Arc::new(detector));
        }

        Ok(ensemble)
    }

    /// Registers a provider, applying any `[detect.providers.<name>]` override
    pub fn add_provider(&mut self, provider: Arc<dyn DetectorProvider>) {
        let settings = self.overrides.get(provider.name());
        let priority = settings
            .and_then(|s| s.priority)
            .unwrap_or_else(|| provider.kind().default_priority());
        let enabled = settings.map(|s| s.enabled).unwrap_or(true);

        tracing::debug!(
            provider = provider.name(),
            kind = ?provider.kind(),
            priority,
            enabled,
            "Registered detector provider"
        );

        self.providers.push(RegisteredProvider {
            provider,
            priority,
            enabled,
        });
    }

    /// Names of enabled providers, in registration order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.provider.name().to_string())
            .collect()
    }

    /// Tie-break priority of every registered provider
    pub fn priorities(&self) -> HashMap<String, i32> {
        self.providers
            .iter()
            .map(|p| (p.provider.name().to_string(), p.priority))
            .collect()
    }

    /// Runs every enabled provider over `text`, plus `extra` providers whose
    /// offsets already refer to the original text
    pub fn run(&self, text: &str, extra: &[&dyn DetectorProvider]) -> DetectionRun {
        let mut run = DetectionRun::default();

        let normalized = self.normalizer.map(|n| n.normalize(text));
        let working = normalized.as_ref().map_or(text, |n| n.text.as_str());

        for registered in self.providers.iter().filter(|p| p.enabled) {
            let provider = registered.provider.as_ref();
            let found = match provider.detect(working) {
                Ok(found) => found,
                Err(e) => {
                    log_provider_failure!(provider.name(), format!("{e:#}"));
                    run.warnings
                        .push(format!("provider '{}' failed: {e:#}", provider.name()));
                    continue;
                }
            };

            for detection in found {
                let projected = match normalized {
                    Some(ref n) if !n.is_identity() => {
                        // Spans must be valid in the working copy before they
                        // can be mapped back
                        if let Err(e) = detection.validate_against(working) {
                            self.reject(&mut run, provider.name(), e.to_string());
                            continue;
                        }
                        match n.project(detection.start, detection.end) {
                            Some((start, end)) => RawDetection::new(
                                text,
                                start,
                                end,
                                detection.category,
                                detection.confidence,
                                detection.source,
                            ),
                            None => {
                                self.reject(
                                    &mut run,
                                    provider.name(),
                                    format!(
                                        "span {}..{} cannot be projected",
                                        detection.start, detection.end
                                    ),
                                );
                                continue;
                            }
                        }
                    }
                    _ => detection.validate_against(text).map(|_| detection),
                };

                match projected {
                    Ok(d) => self.accept(&mut run, d),
                    Err(e) => self.reject(&mut run, provider.name(), e.to_string()),
                }
            }
        }

        for provider in extra {
            match provider.detect(text) {
                Ok(found) => {
                    for detection in found {
                        match detection.validate_against(text) {
                            Ok(()) => self.accept(&mut run, detection),
                            Err(e) => self.reject(&mut run, provider.name(), e.to_string()),
                        }
                    }
                }
                Err(e) => {
                    log_provider_failure!(provider.name(), format!("{e:#}"));
                    run.warnings
                        .push(format!("provider '{}' failed: {e:#}", provider.name()));
                }
            }
        }

        run.detections.sort_by(|a, b| {
            a.position_cmp(b)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.category.cmp(&b.category))
        });
        run
    }

    fn accept(&self, run: &mut DetectionRun, detection: RawDetection) {
        if detection.confidence < self.min_confidence {
            return;
        }
        if !self.allowlist.is_empty()
            && self
                .allowlist
                .contains(&detection.text.trim().to_lowercase())
        {
            tracing::trace!(
                start = detection.start,
                end = detection.end,
                "Dropped allowlisted detection"
            );
            return;
        }
        run.detections.push(detection);
    }

    fn reject(&self, run: &mut DetectionRun, provider: &str, reason: String) {
        log_provider_failure!(provider, reason);
        run.warnings.push(reason);
    }
}

impl Default for DetectorEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::models::PhiCategory;

    struct FailingProvider;

    impl DetectorProvider for FailingProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Model
        }

        fn detect(&self, _text: &str) -> anyhow::Result<Vec<RawDetection>> {
            anyhow::bail!("service unavailable")
        }
    }

    struct SloppyProvider;

    impl DetectorProvider for SloppyProvider {
        fn name(&self) -> &str {
            "sloppy"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Model
        }

        fn detect(&self, text: &str) -> anyhow::Result<Vec<RawDetection>> {
            let good = RawDetection::new(text, 0, 4, PhiCategory::Name, 0.95, "sloppy")?;
            let bad = RawDetection {
                start: 2,
                end: text.len() + 10,
                category: PhiCategory::Name,
                confidence: 0.8,
                source: "sloppy".to_string(),
                text: String::new(),
            };
            Ok(vec![good, bad])
        }
    }

    fn ensemble_with(providers: Vec<Arc<dyn DetectorProvider>>) -> DetectorEnsemble {
        let mut ensemble = DetectorEnsemble::new();
        for provider in providers {
            ensemble.add_provider(provider);
        }
        ensemble
    }

    #[test]
    fn test_failing_provider_contributes_nothing() {
        let ensemble = ensemble_with(vec![
            Arc::new(FailingProvider),
            Arc::new(SloppyProvider),
        ]);
        let run = ensemble.run("John Smith", &[]);
        assert_eq!(run.detections.len(), 1);
        assert_eq!(run.detections[0].text, "John");
        // one provider failure, one malformed span
        assert_eq!(run.warnings.len(), 2);
    }

    #[test]
    fn test_default_priorities_by_kind() {
        let ensemble = ensemble_with(vec![
            Arc::new(RegexDetector::new().unwrap()),
            Arc::new(FailingProvider),
        ]);
        let priorities = ensemble.priorities();
        assert_eq!(priorities["regex"], 100);
        assert_eq!(priorities["flaky"], 50);
    }

    #[test]
    fn test_config_overrides_priority_and_enablement() {
        let mut config = DetectConfig::default();
        config.providers.insert(
            "regex".to_string(),
            ProviderConfig {
                enabled: false,
                priority: Some(7),
            },
        );
        let ensemble = DetectorEnsemble::from_config(&config).unwrap();
        assert_eq!(ensemble.priorities()["regex"], 7);
        assert!(ensemble.provider_names().is_empty());
        assert!(ensemble.run("SSN 123-45-6789", &[]).detections.is_empty());
    }

    #[test]
    fn test_spans_project_back_through_normalization() {
        let config = DetectConfig::default();
        let ensemble = DetectorEnsemble::from_config(&config).unwrap();
        let text = "Patient:   John\u{200B} Smith\nSSN 123-45-6789";
        let run = ensemble.run(text, &[]);

        for d in &run.detections {
            assert_eq!(&text[d.start..d.end], d.text);
        }
        assert!(run
            .detections
            .iter()
            .any(|d| d.category == PhiCategory::UsSsn && d.text == "123-45-6789"));
    }

    #[test]
    fn test_min_confidence_and_allowlist_filter() {
        let config = DetectConfig {
            min_confidence: 0.9,
            allowlist: vec!["john".to_string()],
            ..Default::default()
        };
        let mut ensemble = DetectorEnsemble::from_config(&config).unwrap();
        ensemble.add_provider(Arc::new(SloppyProvider));

        let run = ensemble.run("John called 555-123-4567", &[]);
        // "John" is allowlisted, the 0.85 phone match is below the floor
        assert!(run.detections.is_empty());
    }
}

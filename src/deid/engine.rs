//! De-identification pipeline
//!
//! [`DeidEngine`] wires the detector ensemble, the overlap resolver, the
//! consistency engine, the transformer and the audit logger together.
//!
//! # Examples
//!
//! ```no_run
//! use safeharbor::config::DeidConfig;
//! use safeharbor::deid::DeidEngine;
//!
//! # fn example() -> anyhow::Result<()> {
//! let engine = DeidEngine::new(DeidConfig::default())?;
//! let result = engine.deidentify("Patient: John Smith, MRN: 123456789")?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

use crate::config::DeidConfig;
use crate::deid::audit::AuditLogger;
use crate::deid::consistency::{ConsistencyEngine, JsonFileRegistry, PseudonymRegistry};
use crate::deid::detector::precomputed::PrecomputedSpan;
use crate::deid::detector::{DetectorEnsemble, DetectorProvider, PrecomputedDetector};
use crate::deid::models::{DeidentifiedDocument, MergedEntity};
use crate::deid::report::BatchReport;
use crate::deid::resolver::{OverlapResolver, ResolverSettings};
use crate::deid::transform::{TransformEngine, TransformRules};
use crate::domain::errors::DeidError;
use crate::domain::ids::{DocumentId, SubjectId};
use crate::{log_document_complete, log_document_start};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Name under which per-request detections are reported
pub const PRECOMPUTED_SOURCE: &str = "precomputed";

/// One document to de-identify
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub document_id: DocumentId,
    pub text: String,
    /// Drives per-subject date shifting
    pub subject_id: Option<SubjectId>,
    /// Spans produced outside the engine, in original-text offsets
    pub detections: Vec<PrecomputedSpan>,
}

impl DocumentRequest {
    pub fn new(document_id: DocumentId, text: impl Into<String>) -> Self {
        Self {
            document_id,
            text: text.into(),
            subject_id: None,
            detections: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn with_detections(mut self, detections: Vec<PrecomputedSpan>) -> Self {
        self.detections = detections;
        self
    }
}

/// Documents and report from a batch run
#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful documents in request order
    pub documents: Vec<DeidentifiedDocument>,
    pub report: BatchReport,
    /// Requests never started because shutdown was signalled
    pub skipped: usize,
}

/// Main de-identification engine
///
/// Shareable across tasks with `Arc`; per-document state lives in a
/// consistency session created for each call.
pub struct DeidEngine {
    config: DeidConfig,
    ensemble: DetectorEnsemble,
    resolver: OverlapResolver,
    consistency: ConsistencyEngine,
    transformer: TransformEngine,
    audit_logger: AuditLogger,
}

impl DeidEngine {
    /// Create a new engine
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The pattern library or the pseudonym registry cannot be loaded
    /// - Audit logger initialization fails
    pub fn new(config: DeidConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid de-identification configuration")?;

        let ensemble = DetectorEnsemble::from_config(&config.detect)
            .context("Failed to build detector ensemble")?;
        let resolver = OverlapResolver::new(ResolverSettings::from_config(
            &config.resolve,
            ensemble.priorities(),
        ));

        let mut consistency = ConsistencyEngine::new(&config.security)?;
        if let Some(ref path) = config.security.registry_path {
            let registry = JsonFileRegistry::open(path)?;
            consistency.set_registry(Arc::new(registry));
        }

        let rules = TransformRules::from_config(&config.transform)?;
        let transformer = TransformEngine::new(rules, config.audit.retain_original_text);

        let audit_logger = AuditLogger::new(
            config.audit.log_path.clone(),
            config.audit.json_format,
            config.audit.enabled,
        )?;

        tracing::debug!(
            providers = ?ensemble.provider_names(),
            dry_run = config.application.dry_run,
            audit = config.audit.enabled,
            "De-identification engine ready"
        );

        Ok(Self {
            config,
            ensemble,
            resolver,
            consistency,
            transformer,
            audit_logger,
        })
    }

    /// Adds a detector provider; its priority comes from
    /// `[detect.providers.<name>]` or its kind
    pub fn with_provider(mut self, provider: Arc<dyn DetectorProvider>) -> Self {
        self.ensemble.add_provider(provider);
        self.resolver = OverlapResolver::new(ResolverSettings::from_config(
            &self.config.resolve,
            self.ensemble.priorities(),
        ));
        self
    }

    /// Issues tokens through a shared registry
    pub fn with_registry(mut self, registry: Arc<dyn PseudonymRegistry>) -> Self {
        self.consistency.set_registry(registry);
        self
    }

    /// Forces dry-run mode on or off
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.application.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.application.dry_run
    }

    pub fn config(&self) -> &DeidConfig {
        &self.config
    }

    /// The weak-salt condition, if any
    pub fn salt_warning(&self) -> Option<&DeidError> {
        self.consistency.salt_warning()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.ensemble.provider_names()
    }

    /// De-identify a text with a generated document id
    pub fn deidentify(&self, text: &str) -> Result<DeidentifiedDocument> {
        self.deidentify_document(&DocumentRequest::new(DocumentId::generate(), text))
    }

    /// Detect and resolve entities without transforming anything
    pub fn detect(&self, text: &str) -> Result<Vec<MergedEntity>> {
        let run = self.ensemble.run(text, &[]);
        Ok(self.resolver.resolve(text, run.detections)?)
    }

    /// Detect and resolve the entities of a request, including its
    /// precomputed detections, together with provider warnings
    pub fn detect_document(
        &self,
        request: &DocumentRequest,
    ) -> Result<(Vec<MergedEntity>, Vec<String>)> {
        let precomputed = (!request.detections.is_empty())
            .then(|| PrecomputedDetector::new(PRECOMPUTED_SOURCE, request.detections.clone()));
        let extra: Vec<&dyn DetectorProvider> = precomputed
            .iter()
            .map(|p| p as &dyn DetectorProvider)
            .collect();

        let run = self.ensemble.run(&request.text, &extra);
        let entities = self.resolver.resolve(&request.text, run.detections)?;
        Ok((entities, run.warnings))
    }

    /// De-identify one document
    ///
    /// In dry-run mode the original text is returned together with the
    /// records of what would have been applied.
    pub fn deidentify_document(&self, request: &DocumentRequest) -> Result<DeidentifiedDocument> {
        let start = Instant::now();
        log_document_start!(request.document_id, request.text.len());

        let (entities, warnings) = self.detect_document(request)?;

        let mut session = self.consistency.session(request.subject_id.clone());
        let dry_run = self.is_dry_run();
        let output = if dry_run {
            self.transformer.plan(&request.text, &entities, &mut session)?
        } else {
            self.transformer
                .transform(&request.text, &entities, &mut session)?
        };

        let elapsed = start.elapsed();
        let document = DeidentifiedDocument::new(
            request.document_id.clone(),
            output.text,
            output.records,
            elapsed.as_millis() as u64,
            dry_run,
        )
        .with_warnings(warnings);

        self.audit_logger
            .log_document(&document)
            .context("Failed to write audit log")?;

        log_document_complete!(request.document_id, document.entities.len(), elapsed);
        Ok(document)
    }

    /// De-identify many documents in parallel
    ///
    /// A failing document is recorded in the report and does not stop the
    /// others.
    pub async fn deidentify_batch(
        self: &Arc<Self>,
        requests: Vec<DocumentRequest>,
        concurrency: usize,
    ) -> BatchOutcome {
        self.run_batch(requests, concurrency, None).await
    }

    /// Like [`deidentify_batch`](Self::deidentify_batch), but stops starting
    /// new documents once `shutdown` turns true; in-flight ones finish
    pub async fn deidentify_batch_until(
        self: &Arc<Self>,
        requests: Vec<DocumentRequest>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> BatchOutcome {
        self.run_batch(requests, concurrency, Some(shutdown)).await
    }

    async fn run_batch(
        self: &Arc<Self>,
        requests: Vec<DocumentRequest>,
        concurrency: usize,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> BatchOutcome {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut report = BatchReport::new(self.is_dry_run());
        let mut skipped = 0;

        tracing::info!(documents = total, concurrency, "Starting batch");

        for (index, request) in requests.into_iter().enumerate() {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                skipped = total - index;
                tracing::warn!(skipped, "Shutdown requested, not starting remaining documents");
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    report.add_failure(request.document_id.as_str(), e.to_string());
                    continue;
                }
            };

            let engine = Arc::clone(self);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = engine.deidentify_document(&request);
                (index, request.document_id, result)
            });
        }

        let mut finished: Vec<(usize, DeidentifiedDocument)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(document))) => finished.push((index, document)),
                Ok((_, document_id, Err(e))) => {
                    tracing::error!(
                        document_id = %document_id,
                        error = %format!("{e:#}"),
                        "Failed to de-identify document"
                    );
                    report.add_failure(document_id.as_str(), format!("{e:#}"));
                }
                Err(e) => {
                    tracing::error!(error = %e, "De-identification task failed");
                    report.add_failure("<unknown>", format!("task failed: {e}"));
                }
            }
        }

        finished.sort_by_key(|(index, _)| *index);
        for (_, document) in &finished {
            report.add_document(document);
        }

        if let Some(warning) = self.salt_warning() {
            report.add_warning(warning.to_string());
        }
        if skipped > 0 {
            report.add_warning(format!("{skipped} documents skipped after shutdown signal"));
        }
        if let Some(registry) = self.consistency.registry() {
            if let Err(e) = registry.flush() {
                report.add_warning(format!("Failed to persist pseudonym registry: {e:#}"));
            }
        }

        tracing::info!(
            succeeded = finished.len(),
            failed = report.failures.len(),
            skipped,
            "Batch complete"
        );

        BatchOutcome {
            documents: finished.into_iter().map(|(_, document)| document).collect(),
            report,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use crate::deid::models::PhiCategory;
    use crate::deid::transform::Strategy;

    fn config() -> DeidConfig {
        let mut config = DeidConfig::default();
        config.security.salt = Some(secret_string("engine-test-salt".to_string()));
        config
    }

    #[test]
    fn test_engine_creation() {
        assert!(DeidEngine::new(config()).is_ok());
    }

    #[test]
    fn test_header_scenario() {
        let engine = DeidEngine::new(config()).unwrap();
        let text = "Patient: John Smith, MRN: 123456789, DOB: 01/15/1980";
        let result = engine.deidentify(text).unwrap();

        assert_eq!(result.entities.len(), 3);
        assert!(result.text.starts_with("Patient: PERSON_"));
        assert!(result.text.contains(", MRN: MRN_"));
        assert!(result.text.ends_with(", DOB: 02/14/1980"));
        assert!(!result.text.contains("John"));
        assert!(!result.dry_run);
    }

    #[test]
    fn test_dry_run_returns_original_text() {
        let engine = DeidEngine::new(config()).unwrap().with_dry_run(true);
        let text = "Call 555-123-4567";
        let result = engine.deidentify(text).unwrap();
        assert_eq!(result.text, text);
        assert!(result.dry_run);
        assert_eq!(result.entities[0].strategy, Strategy::Redact);
    }

    #[test]
    fn test_precomputed_detections_join_the_ensemble() {
        let engine = DeidEngine::new(config()).unwrap();
        let text = "Seen at Mercy General today";
        let request = DocumentRequest::new(DocumentId::new("doc-1").unwrap(), text)
            .with_detections(vec![PrecomputedSpan {
                start: 8,
                end: 21,
                category: "ORGANIZATION".to_string(),
                confidence: 0.8,
                source: None,
                text: None,
            }]);
        let result = engine.deidentify_document(&request).unwrap();
        assert_eq!(result.text, "Seen at [REDACTED:ORGANIZATION] today");
        assert_eq!(result.entities[0].sources, vec![PRECOMPUTED_SOURCE]);
    }

    #[test]
    fn test_detect_returns_resolved_entities() {
        let engine = DeidEngine::new(config()).unwrap();
        let entities = engine.detect("SSN 123-45-6789").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].category, PhiCategory::UsSsn);
        assert!(entities[0].is_final);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let engine = Arc::new(DeidEngine::new(config()).unwrap());
        let requests: Vec<DocumentRequest> = (0..5)
            .map(|i| {
                DocumentRequest::new(
                    DocumentId::new(format!("doc-{i}")).unwrap(),
                    format!("MRN: {i}0000{i}"),
                )
            })
            .collect();

        let outcome = engine.deidentify_batch(requests, 2).await;
        assert_eq!(outcome.documents.len(), 5);
        assert_eq!(outcome.report.total_documents, 5);
        assert_eq!(outcome.documents[3].document_id.as_str(), "doc-3");
        assert_eq!(outcome.skipped, 0);
    }
}

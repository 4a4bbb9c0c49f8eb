//! Integration tests for parallel batch de-identification and shutdown

use safeharbor::config::{secret_string, DeidConfig};
use safeharbor::deid::consistency::{InMemoryRegistry, PseudonymRegistry};
use safeharbor::deid::{DeidEngine, DocumentRequest};
use safeharbor::domain::DocumentId;
use std::sync::Arc;
use tokio::sync::watch;

fn engine() -> DeidEngine {
    let mut config = DeidConfig::default();
    config.security.salt = Some(secret_string("batch-integration-salt".to_string()));
    DeidEngine::new(config).unwrap()
}

fn requests(texts: &[&str]) -> Vec<DocumentRequest> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| DocumentRequest::new(DocumentId::new(format!("doc-{i}")).unwrap(), *text))
        .collect()
}

/// Registry whose backing store is unavailable
struct BrokenRegistry;

impl PseudonymRegistry for BrokenRegistry {
    fn get_or_insert_with(
        &self,
        _fingerprint: &str,
        _make: &dyn Fn() -> String,
    ) -> anyhow::Result<String> {
        anyhow::bail!("registry unavailable")
    }

    fn len(&self) -> usize {
        0
    }
}

#[tokio::test]
async fn test_same_value_gets_same_token_across_parallel_documents() {
    let registry = Arc::new(InMemoryRegistry::new());
    let engine = Arc::new(engine().with_registry(registry.clone()));

    let texts: Vec<String> = (0..24).map(|i| format!("Visit {i}. MRN: 7788990")).collect();
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();

    let outcome = engine.deidentify_batch(requests(&texts), 6).await;
    assert_eq!(outcome.documents.len(), 24);
    assert!(!outcome.report.has_failures());

    let replaced: Vec<_> = outcome
        .documents
        .iter()
        .map(|d| d.text.split("MRN: ").nth(1).unwrap().to_string())
        .collect();
    assert!(replaced.iter().all(|r| r == &replaced[0]));
    assert_eq!(registry.len(), 1);

    // Output order follows input order
    for (i, document) in outcome.documents.iter().enumerate() {
        assert_eq!(document.document_id.as_str(), format!("doc-{i}"));
        assert!(document.text.starts_with(&format!("Visit {i}.")));
    }
}

#[tokio::test]
async fn test_failing_document_does_not_stop_batch() {
    let engine = Arc::new(engine().with_registry(Arc::new(BrokenRegistry)));

    let outcome = engine
        .deidentify_batch(
            requests(&["Call 555-123-4567", "MRN: 1234567", "No identifiers"]),
            2,
        )
        .await;

    assert_eq!(outcome.documents.len(), 2);
    assert_eq!(outcome.report.total_documents, 2);
    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].document_id, "doc-1");
    assert!(outcome.report.failures[0].error.contains("registry unavailable"));
    assert_eq!(outcome.documents[0].text, "Call [REDACTED:PHONE_NUMBER]");
}

#[tokio::test]
async fn test_shutdown_before_start_skips_everything() {
    let engine = Arc::new(engine());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let outcome = engine
        .deidentify_batch_until(requests(&["MRN: 1234567", "MRN: 7654321"]), 2, shutdown_rx)
        .await;

    assert!(outcome.documents.is_empty());
    assert_eq!(outcome.skipped, 2);
    assert!(outcome
        .report
        .warnings
        .iter()
        .any(|w| w.contains("2 documents skipped")));
}

#[tokio::test]
async fn test_batch_report_aggregates_categories() {
    let engine = Arc::new(engine());
    let outcome = engine
        .deidentify_batch(
            requests(&[
                "Patient: John Smith, MRN: 123456789, DOB: 01/15/1980",
                "Call 555-123-4567",
                "Nothing to see",
            ]),
            3,
        )
        .await;

    let report = &outcome.report;
    assert_eq!(report.total_documents, 3);
    assert_eq!(report.total_entities, 4);
    assert_eq!(report.stats.documents_with_phi, 2);
    assert_eq!(report.stats.documents_without_phi, 1);

    let json: serde_json::Value = serde_json::from_str(&report.format_json().unwrap()).unwrap();
    assert_eq!(json["entities_by_category"]["NAME"], 1);
    assert_eq!(json["entities_by_strategy"]["redact"], 1);
    assert_eq!(json["entities_by_strategy"]["date_shift"], 1);
}

#[tokio::test]
async fn test_weak_salt_is_reported() {
    let engine = Arc::new(DeidEngine::new(DeidConfig::default()).unwrap());
    assert!(engine.salt_warning().is_some());

    let outcome = engine.deidentify_batch(requests(&["Nothing"]), 1).await;
    assert!(outcome
        .report
        .warnings
        .iter()
        .any(|w| w.to_lowercase().contains("salt")));
}

use crate::error::SocError;
use crate::forensics::{
    canonical_payload, resolve_signer, ChainSigner, ForensicExportReport, ForensicsExporter,
    GENESIS,
};
use crate::security_log::{
    tests::BrokenEventStore, Correlation, EventDetails, EventKind, EventStore, LogLevel,
    MemoryEventStore, SecurityLogEntry,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "forensics-suite-secret-0123456789abcdef";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn entries() -> Vec<SecurityLogEntry> {
    vec![
        SecurityLogEntry::new(
            LogLevel::Warn,
            EventKind::FailedLogin,
            Some(&EventDetails::metadata().with("attempt", json!(1))),
            Correlation::new().with_user_id("trader-5").with_ip("203.0.113.8"),
        )
        .with_created_at(t0()),
        SecurityLogEntry::new(
            LogLevel::Critical,
            EventKind::AuthCompromise,
            Some(&EventDetails::metadata().with("reason", json!("token reuse"))),
            Correlation::new().with_user_id("trader-5"),
        )
        .with_created_at(t0() + Duration::minutes(1)),
        SecurityLogEntry::new(
            LogLevel::Audit,
            EventKind::AdminAction,
            None,
            Correlation::new().with_user_id("admin-2"),
        )
        .with_created_at(t0() + Duration::minutes(2)),
    ]
}

async fn exporter_with(entries: &[SecurityLogEntry]) -> ForensicsExporter {
    let store = Arc::new(MemoryEventStore::new());
    for entry in entries {
        store.append(entry).await.unwrap();
    }
    ForensicsExporter::new(store, ChainSigner::new(SECRET).unwrap())
}

async fn export_all(exporter: &ForensicsExporter) -> ForensicExportReport {
    exporter
        .export(t0() - Duration::hours(1), t0() + Duration::hours(1), None)
        .await
        .unwrap()
}

fn signatures(report: &ForensicExportReport) -> Vec<String> {
    report.records.iter().map(|r| r.signature.clone()).collect()
}

#[tokio::test]
async fn test_export_is_deterministic() {
    let exporter = exporter_with(&entries()).await;

    let first = export_all(&exporter).await;
    let second = export_all(&exporter).await;

    assert_eq!(first.metadata.record_count, 3);
    assert_eq!(signatures(&first), signatures(&second));
    assert_eq!(first.metadata.final_signature, second.metadata.final_signature);
    assert_eq!(
        first.metadata.final_signature,
        first.records.last().unwrap().signature
    );
}

#[tokio::test]
async fn test_chain_reproduces_from_raw_entries() {
    let exporter = exporter_with(&entries()).await;
    let report = export_all(&exporter).await;

    let signer = ChainSigner::new(SECRET).unwrap();
    let mut previous = GENESIS.to_string();
    for record in &report.records {
        assert!(signer.verify_link(&record.entry, &previous, &record.signature).unwrap());
        previous = record.signature.clone();
    }
}

#[tokio::test]
async fn test_tampered_entry_changes_chain_from_that_point() {
    let original = export_all(&exporter_with(&entries()).await).await;

    let mut tampered = entries();
    tampered[1].details = Some(json!({"reason": "nothing to see"}));
    let altered = export_all(&exporter_with(&tampered).await).await;

    let a = signatures(&original);
    let b = signatures(&altered);
    assert_eq!(a[0], b[0]);
    assert_ne!(a[1], b[1]);
    assert_ne!(a[2], b[2]);
    assert_ne!(
        original.metadata.final_signature,
        altered.metadata.final_signature
    );
}

#[tokio::test]
async fn test_reordering_changes_chain_from_swap_point() {
    let exporter = exporter_with(&entries()).await;
    let report = export_all(&exporter).await;

    // Swap the last two records, keeping each entry's own content
    let mut swapped: Vec<SecurityLogEntry> =
        report.records.iter().map(|r| r.entry.clone()).collect();
    swapped.swap(1, 2);
    let resigned = exporter.sign_chain(swapped).unwrap();

    assert_eq!(resigned[0].signature, report.records[0].signature);
    assert_ne!(resigned[1].signature, report.records[1].signature);
    assert_ne!(resigned[2].signature, report.records[2].signature);
}

#[tokio::test]
async fn test_genesis_handling() {
    let empty = exporter_with(&[]).await;
    let report = export_all(&empty).await;
    assert_eq!(report.metadata.record_count, 0);
    assert_eq!(report.metadata.final_signature, GENESIS);

    let exporter = exporter_with(&entries()).await;
    let report = export_all(&exporter).await;
    let first = &report.records[0];
    assert!(canonical_payload(&first.entry, GENESIS).contains(r#""previousSignature":"genesis""#));
    assert_eq!(
        ChainSigner::new(SECRET)
            .unwrap()
            .sign_link(&first.entry, GENESIS)
            .unwrap(),
        first.signature
    );
}

#[tokio::test]
async fn test_records_are_ascending_and_filtered_by_user() {
    let mut shuffled = entries();
    shuffled.reverse();
    let exporter = exporter_with(&shuffled).await;

    let report = exporter
        .export(
            t0() - Duration::hours(1),
            t0() + Duration::hours(1),
            Some("trader-5"),
        )
        .await
        .unwrap();

    assert_eq!(report.metadata.record_count, 2);
    assert_eq!(report.metadata.target_user.as_deref(), Some("trader-5"));
    assert!(report.records[0].entry.created_at < report.records[1].entry.created_at);
}

#[tokio::test]
async fn test_verify_detects_edits_after_export() {
    let exporter = exporter_with(&entries()).await;
    let report = export_all(&exporter).await;

    // Round-trip through JSON as an auditor would receive it
    let json = serde_json::to_string(&report).unwrap();
    let mut received: ForensicExportReport = serde_json::from_str(&json).unwrap();

    let clean = exporter.verify(&received).unwrap();
    assert!(clean.valid);
    assert_eq!(clean.first_mismatch, None);

    received.records[1].entry.ip = Some("10.9.9.9".to_string());
    let dirty = exporter.verify(&received).unwrap();
    assert!(!dirty.valid);
    assert_eq!(dirty.first_mismatch, Some(1));

    let mut truncated = report.clone();
    truncated.records.pop();
    assert!(!exporter.verify(&truncated).unwrap().valid);
}

#[tokio::test]
async fn test_different_secret_yields_different_chain() {
    let report = export_all(&exporter_with(&entries()).await).await;

    let store = Arc::new(MemoryEventStore::new());
    for entry in entries() {
        store.append(&entry).await.unwrap();
    }
    let other = ForensicsExporter::new(store, ChainSigner::insecure_fallback());
    let other_report = export_all(&other).await;

    assert_ne!(
        report.metadata.final_signature,
        other_report.metadata.final_signature
    );
    assert!(!other.verify(&report).unwrap().valid);
}

#[tokio::test]
async fn test_read_failure_yields_no_report() {
    let exporter = ForensicsExporter::new(
        Arc::new(BrokenEventStore),
        ChainSigner::new(SECRET).unwrap(),
    );

    let err = exporter
        .export(t0() - Duration::hours(1), t0(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SocError::Persistence { .. }));
}

#[tokio::test]
async fn test_inverted_range_is_rejected() {
    let exporter = exporter_with(&entries()).await;
    let err = exporter
        .export(t0(), t0() - Duration::hours(1), None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_secret_resolution() {
    assert!(resolve_signer(Some(SECRET), true).is_ok());
    assert!(matches!(
        resolve_signer(None, true).unwrap_err(),
        SocError::Configuration { .. }
    ));
    assert!(resolve_signer(Some("   "), true).is_err());
    assert!(resolve_signer(None, false).is_ok());
    assert!(resolve_signer(Some("too-short"), false).is_err());
}

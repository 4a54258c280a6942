use crate::error::{SocError, SocResult};
use crate::forensics::chain_signer::{ChainSigner, GENESIS};
use crate::metrics::FORENSIC_EXPORTS;
use crate::security_log::{EventStore, SecurityLogEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
    pub time_range: TimeRange,
    pub target_user: Option<String>,
    pub final_signature: String,
}

/// A log entry as exported, carrying its link in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRecord {
    #[serde(flatten)]
    pub entry: SecurityLogEntry,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicExportReport {
    pub metadata: ExportMetadata,
    pub records: Vec<SignedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub record_count: usize,
    /// Index of the first record whose signature does not match
    pub first_mismatch: Option<usize>,
}

/// Produces tamper-evident snapshots of the security log
pub struct ForensicsExporter {
    store: Arc<dyn EventStore>,
    signer: ChainSigner,
}

impl ForensicsExporter {
    pub fn new(store: Arc<dyn EventStore>, signer: ChainSigner) -> Self {
        Self { store, signer }
    }

    /// Export every entry in `[start, end]`, oldest first.
    ///
    /// Any read or signing failure aborts the whole export.
    pub async fn export(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> SocResult<ForensicExportReport> {
        if start > end {
            return Err(SocError::validation("timeRange", "start must not be after end"));
        }

        let entries = self
            .store
            .range(start, end, user_id)
            .await
            .map_err(|e| SocError::persistence("export_range", e))?;

        let records = self.sign_chain(entries)?;
        let final_signature = records
            .last()
            .map(|record| record.signature.clone())
            .unwrap_or_else(|| GENESIS.to_string());

        FORENSIC_EXPORTS.inc();
        info!(
            record_count = records.len(),
            target_user = ?user_id,
            %start,
            %end,
            "Forensic export generated"
        );

        Ok(ForensicExportReport {
            metadata: ExportMetadata {
                generated_at: Utc::now(),
                record_count: records.len(),
                time_range: TimeRange { start, end },
                target_user: user_id.map(str::to_string),
                final_signature,
            },
            records,
        })
    }

    /// Recompute the chain over the records as given
    pub fn verify(&self, report: &ForensicExportReport) -> SocResult<ChainVerification> {
        let mut previous = GENESIS.to_string();
        let mut first_mismatch = None;

        for (index, record) in report.records.iter().enumerate() {
            let expected = self.signer.sign_link(&record.entry, &previous)?;
            if first_mismatch.is_none()
                && !constant_time_eq::constant_time_eq(
                    record.signature.as_bytes(),
                    expected.as_bytes(),
                )
            {
                first_mismatch = Some(index);
            }
            previous = expected;
        }

        let final_matches = constant_time_eq::constant_time_eq(
            report.metadata.final_signature.as_bytes(),
            previous.as_bytes(),
        );
        let count_matches = report.metadata.record_count == report.records.len();

        Ok(ChainVerification {
            valid: first_mismatch.is_none() && final_matches && count_matches,
            record_count: report.records.len(),
            first_mismatch,
        })
    }

    pub(crate) fn sign_chain(&self, entries: Vec<SecurityLogEntry>) -> SocResult<Vec<SignedRecord>> {
        let mut previous = GENESIS.to_string();
        let mut records = Vec::with_capacity(entries.len());

        for entry in entries {
            let signature = self.signer.sign_link(&entry, &previous)?;
            previous = signature.clone();
            records.push(SignedRecord { entry, signature });
        }

        Ok(records)
    }
}

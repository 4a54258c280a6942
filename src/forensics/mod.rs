pub mod api;
pub mod chain_signer;
pub mod exporter;

#[cfg(test)]
mod tests;

pub use chain_signer::{canonical_payload, ChainSigner, GENESIS, INSECURE_FALLBACK_SECRET};
pub use exporter::{
    ChainVerification, ExportMetadata, ForensicExportReport, ForensicsExporter, SignedRecord,
    TimeRange,
};

use crate::error::{SocError, SocResult};

/// Pick the signing secret for this deployment.
///
/// A configured secret always wins. Without one, production refuses to start
/// and every other environment falls back to the well-known insecure secret.
pub fn resolve_signer(secret: Option<&str>, production: bool) -> SocResult<ChainSigner> {
    match secret.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => ChainSigner::new(secret),
        None if production => Err(SocError::configuration(
            "forensics.signing_secret must be set in production",
        )),
        None => {
            tracing::warn!(
                "No forensics signing secret configured, using the insecure development fallback"
            );
            Ok(ChainSigner::insecure_fallback())
        }
    }
}

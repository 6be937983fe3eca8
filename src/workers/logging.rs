//! Worker that logs manifest events without any other side effect.

use crate::error::Result;
use crate::types::{ArtifactKind, Artifacts, SiteInfo};
use crate::workers::OutputWorker;
use tracing::info;

const NAME: &str = "logging worker";

/// Logs every manifest it sees. Requires the compressed and decoded forms so
/// it only fires for jobs that at least decoded successfully.
pub struct LoggingWorker {
    required: [ArtifactKind; 2],
}

impl LoggingWorker {
    pub fn new() -> Self {
        Self {
            required: [ArtifactKind::Compressed, ArtifactKind::Decoded],
        }
    }
}

impl Default for LoggingWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputWorker for LoggingWorker {
    fn name(&self) -> &str {
        NAME
    }

    fn required_artifacts(&self) -> &[ArtifactKind] {
        &self.required
    }

    fn process_manifest(&self, artifacts: &Artifacts, site: &SiteInfo) -> Result<()> {
        let decoded_len = artifacts
            .get(ArtifactKind::Decoded)
            .map(|m| m.len())
            .unwrap_or(0);
        info!(
            urn = site.urn,
            uuid = site.uuid,
            site = site.sm_name,
            site_guid = site.sm_guid,
            decoded_len,
            "manifest event"
        );
        Ok(())
    }
}

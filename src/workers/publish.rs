//! Worker that publishes the converted manifest to a configured target.
//!
//! The target URL's scheme selects behavior: `file` writes next to the given
//! path, `http`/`https` issues a PUT with the manifest as the body, `exec`
//! runs a local executable with the manifest's temp-file path as argument
//! and captures its output.

use crate::error::{RelayError, Result};
use crate::types::{ArtifactKind, Artifacts, SiteInfo};
use crate::workers::OutputWorker;
use std::io::Write;
use std::process::Command;
use std::time::Duration;
use tracing::info;
use url::Url;

const NAME: &str = "publish worker";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes each converted manifest to one URL target.
pub struct PublishWorker {
    target: Url,
    client: reqwest::blocking::Client,
    required: [ArtifactKind; 1],
}

impl PublishWorker {
    /// Fails on an unparseable URL or an unsupported scheme; both are
    /// configuration errors.
    pub fn new(publish_url: &str) -> Result<Self> {
        let target = Url::parse(publish_url)?;
        match target.scheme() {
            "file" | "http" | "https" | "exec" => {}
            other => {
                return Err(RelayError::Config(format!(
                    "unsupported publish URL scheme: {other}"
                )))
            }
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            target,
            client,
            required: [ArtifactKind::Converted],
        })
    }

    fn publish_file(&self, converted: &str, site: &SiteInfo) -> Result<()> {
        let path = format!("{}-{}---{}", self.target.path(), site.urn, site.uuid);
        info!(path, "writing converted manifest");
        std::fs::write(&path, converted)?;
        Ok(())
    }

    fn publish_http(&self, converted: &str) -> Result<()> {
        info!(target = %self.target, "pushing converted manifest");
        self.client
            .put(self.target.clone())
            .body(converted.to_string())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn publish_exec(&self, converted: &str) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(converted.as_bytes())?;
        tmp.flush()?;

        let program = self.target.path();
        info!(program, "running publish script");
        let output = Command::new(program).arg(tmp.path()).output()?;
        info!(
            program,
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout),
            "publish script finished"
        );
        if !output.status.success() {
            return Err(RelayError::Worker {
                name: NAME.into(),
                reason: format!("publish script exited with {}", output.status),
            });
        }
        Ok(())
    }
}

impl OutputWorker for PublishWorker {
    fn name(&self) -> &str {
        NAME
    }

    fn required_artifacts(&self) -> &[ArtifactKind] {
        &self.required
    }

    fn process_manifest(&self, artifacts: &Artifacts, site: &SiteInfo) -> Result<()> {
        let converted = artifacts.get(ArtifactKind::Converted).ok_or_else(|| {
            RelayError::Worker {
                name: NAME.into(),
                reason: "converted artifact missing".into(),
            }
        })?;

        match self.target.scheme() {
            "file" => self.publish_file(converted, site),
            "http" | "https" => self.publish_http(converted),
            "exec" => self.publish_exec(converted),
            // Unreachable: the scheme was validated at construction.
            other => Err(RelayError::Config(format!(
                "unsupported publish URL scheme: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteInfo {
        SiteInfo {
            urn: "web".into(),
            uuid: "1111".into(),
            sm_name: "rdu".into(),
            sm_guid: "abcd".into(),
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            PublishWorker::new("ftp://example.net/out"),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn file_scheme_writes_named_output() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("manifests");
        let worker = PublishWorker::new(&format!("file://{}", base.display())).unwrap();

        let mut artifacts = Artifacts::new();
        artifacts.insert(ArtifactKind::Converted, "<rspec/>".into());
        worker.process_manifest(&artifacts, &site()).unwrap();

        let expected = format!("{}-web---1111", base.display());
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "<rspec/>");
    }

    #[test]
    fn requires_converted_artifact() {
        let worker = PublishWorker::new("file:///tmp/out").unwrap();
        let artifacts = Artifacts::new();
        assert!(worker.process_manifest(&artifacts, &site()).is_err());
    }
}

//! The manifest-processing pipeline.
//!
//! Publish events on manifest topics are turned into jobs and handed to a
//! small pool of worker threads, so a slow converter or output worker never
//! blocks transport event delivery or other manifests. Each job decodes and
//! decompresses the payload, converts it through the converter pool, and
//! fans the artifacts out to the registered output workers.

use crate::codec;
use crate::convert::ManifestConverter;
use crate::naming;
use crate::state::SharedState;
use crate::transport::ItemHandler;
use crate::types::{ArtifactKind, Artifacts, ManifestJob, SiteInfo};
use crate::workers;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ManifestPipeline {
    state: Arc<SharedState>,
    jobs: Sender<ManifestJob>,
}

impl ManifestPipeline {
    /// Start the pipeline with `threads` job workers. Threads exit when the
    /// pipeline is dropped and the job queue drains.
    pub fn new(
        state: Arc<SharedState>,
        converter: Arc<dyn ManifestConverter>,
        threads: usize,
    ) -> Arc<Self> {
        let (jobs, rx) = unbounded::<ManifestJob>();
        for n in 0..threads.max(1) {
            let rx: Receiver<ManifestJob> = rx.clone();
            let state = state.clone();
            let converter = converter.clone();
            std::thread::Builder::new()
                .name(format!("manifest-{n}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        process_job(&state, converter.as_ref(), job);
                    }
                })
                .expect("failed to spawn pipeline thread");
        }
        Arc::new(Self { state, jobs })
    }
}

impl ItemHandler for ManifestPipeline {
    fn handle_items(&self, topic: &str, items: &[String]) {
        if self.state.is_shutting_down() {
            return;
        }
        self.state.inc_events();

        info!(topic, "received manifest publish event");
        let site = match naming::parse_manifest_topic(topic) {
            Some(site) => site,
            None => {
                // Permanent condition, no retry.
                error!(topic, "cannot parse site identifiers from topic name, dropping event");
                return;
            }
        };

        for payload in items {
            // Unbounded queue: never blocks the transport I/O thread.
            let job = ManifestJob {
                payload: payload.clone(),
                site: site.clone(),
                origin_topic: topic.to_string(),
            };
            if self.jobs.send(job).is_err() {
                error!(topic, "pipeline stopped, dropping manifest event");
            }
        }
    }
}

/// Path for a debug artifact dump.
fn dump_path(kind: ArtifactKind, site: &SiteInfo) -> PathBuf {
    std::env::temp_dir().join(format!("{}{}---{}", kind.stage(), site.urn, site.uuid))
}

fn dump_artifact(state: &SharedState, kind: ArtifactKind, payload: &str, site: &SiteInfo) {
    if !state.debug_dump() {
        return;
    }
    let path = dump_path(kind, site);
    info!(path = %path.display(), "writing manifest artifact");
    if let Err(e) = std::fs::write(&path, payload) {
        error!(path = %path.display(), "unable to write artifact dump: {e}");
    }
}

/// One pipeline run: decode, convert, fan out. Every failure is isolated to
/// this job.
fn process_job(state: &SharedState, converter: &dyn ManifestConverter, job: ManifestJob) {
    let site = &job.site;
    info!(manifest = %site, "decoding manifest");
    dump_artifact(state, ArtifactKind::Compressed, &job.payload, site);

    let decoded = match codec::decode_manifest(&job.payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(manifest = %site, topic = job.origin_topic, "unable to decode manifest: {e}");
            return;
        }
    };
    dump_artifact(state, ArtifactKind::Decoded, &decoded, site);

    debug!(manifest = %site, "running manifest through converter");
    let converted = match converter.convert(&decoded, &site.urn) {
        Ok(converted) => converted,
        Err(e) => {
            error!(manifest = %site, "error converting manifest: {e}");
            return;
        }
    };
    dump_artifact(state, ArtifactKind::Converted, &converted, site);

    let mut artifacts = Artifacts::new();
    artifacts.insert(ArtifactKind::Compressed, job.payload);
    artifacts.insert(ArtifactKind::Decoded, decoded);
    artifacts.insert(ArtifactKind::Converted, converted);

    workers::dispatch(&state.workers(), &artifacts, site);
}

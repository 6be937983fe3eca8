//! Output worker contract and registry.
//!
//! Workers are pluggable consumers of pipeline artifacts. Each declares the
//! artifact kinds it requires; dispatch skips a worker whose requirements
//! are not met by a given job and isolates workers from each other's
//! failures. Workers are configured by registry name and live for the
//! process lifetime.

mod logging;
mod publish;

pub use logging::LoggingWorker;
pub use publish::PublishWorker;

use crate::error::{RelayError, Result};
use crate::types::{ArtifactKind, Artifacts, SiteInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A pluggable consumer of manifest artifacts.
pub trait OutputWorker: Send + Sync {
    /// Human-readable name, used for logging and dispatch diagnostics.
    fn name(&self) -> &str;

    /// Artifact kinds this worker requires. A job missing any of them is
    /// skipped for this worker.
    fn required_artifacts(&self) -> &[ArtifactKind];

    /// Process one manifest job. Errors are isolated to this worker.
    fn process_manifest(&self, artifacts: &Artifacts, site: &SiteInfo) -> Result<()>;

    /// Invoked once per process at registration time, e.g. to prime
    /// connection pools. Failures are logged but do not block other workers.
    fn run_at_startup(&self) -> Result<()> {
        Ok(())
    }
}

/// Fan one job's artifacts out to every worker, in registration order.
///
/// A worker missing a required artifact is skipped with a log line; a worker
/// returning an error is logged and does not stop subsequent workers.
pub fn dispatch(workers: &[Arc<dyn OutputWorker>], artifacts: &Artifacts, site: &SiteInfo) {
    for worker in workers {
        let missing: Vec<ArtifactKind> = worker
            .required_artifacts()
            .iter()
            .copied()
            .filter(|kind| !artifacts.contains(*kind))
            .collect();
        if !missing.is_empty() {
            warn!(
                worker = worker.name(),
                ?missing,
                manifest = %site,
                "skipping worker, required artifacts not available"
            );
            continue;
        }
        if let Err(e) = worker.process_manifest(artifacts, site) {
            error!(worker = worker.name(), manifest = %site, "worker failed: {e}");
        }
    }
}

type WorkerFactory = Box<dyn Fn() -> Arc<dyn OutputWorker> + Send + Sync>;

/// Maps configuration-supplied names to worker constructors. Replaces
/// reflection-style instantiation: built-ins are registered explicitly and
/// embedders may add their own before building.
pub struct WorkerRegistry {
    factories: HashMap<String, WorkerFactory>,
}

impl WorkerRegistry {
    /// Empty registry, no built-ins.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in workers. The publish worker requires a
    /// publish URL and is only registered when one is configured.
    pub fn with_builtins(publish_url: Option<&str>) -> Result<Self> {
        let mut registry = Self::empty();
        registry.register("logging", || Arc::new(LoggingWorker::new()) as Arc<dyn OutputWorker>);
        if let Some(url) = publish_url {
            let worker: Arc<dyn OutputWorker> = Arc::new(PublishWorker::new(url)?);
            registry.register("publish", move || worker.clone());
        }
        Ok(registry)
    }

    /// Register a factory under a configuration name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn OutputWorker> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Instantiate workers for the configured names, preserving order.
    /// Unknown names are fatal configuration errors.
    pub fn build(&self, names: &[String]) -> Result<Vec<Arc<dyn OutputWorker>>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let factory = self.factories.get(name.trim()).ok_or_else(|| {
                RelayError::Config(format!("unknown worker name: {name}"))
            })?;
            out.push(factory());
        }
        Ok(out)
    }
}

/// Run every worker's startup hook, isolating failures.
pub fn run_startup_hooks(workers: &[Arc<dyn OutputWorker>]) {
    for worker in workers {
        info!(worker = worker.name(), "running worker startup hook");
        if let Err(e) = worker.run_at_startup() {
            error!(worker = worker.name(), "worker startup hook failed: {e}");
        }
    }
}

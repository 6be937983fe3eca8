//! Daemon lifecycle: startup, background loops, reconnect, shutdown.
//!
//! `Daemon::start` wires the shared state, pipeline, reconciler and
//! background loops together and performs the initial subscribe pass over
//! the site list topics of interest. Teardown is an explicit, idempotent
//! `shutdown` call; background loops are owned, cancellable threads rather
//! than ambient runtime hooks.

use crate::config::RelayConfig;
use crate::convert::{ConverterPool, ManifestConverter};
use crate::error::{RelayError, Result};
use crate::naming;
use crate::pipeline::ManifestPipeline;
use crate::reconcile::TopicListReconciler;
use crate::resubscribe::ResubscribeTask;
use crate::state::SharedState;
use crate::transport::Transport;
use crate::workers::{self, WorkerRegistry};
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Bound on one converter RPC attempt.
const CONVERT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Daemon {
    state: Arc<SharedState>,
    transport: Arc<dyn Transport>,
    reconciler: Arc<TopicListReconciler>,
    /// Kept alive for the daemon lifetime; subscriptions hold clones.
    _pipeline: Arc<ManifestPipeline>,
    /// Held during startup and reconnect reseeding so shutdown cannot
    /// interleave with either.
    startup_gate: Arc<Mutex<()>>,
    /// Dropping the sender cancels the background loops.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Daemon {
    /// Start the daemon with the built-in worker registry.
    ///
    /// `local_converter` backs conversion when no remote endpoints are
    /// configured; omitting both is a configuration error.
    pub fn start(
        config: &RelayConfig,
        transport: Arc<dyn Transport>,
        local_converter: Option<Arc<dyn ManifestConverter>>,
    ) -> Result<Self> {
        let registry = WorkerRegistry::with_builtins(config.publish_url.as_deref())?;
        Self::start_with_registry(config, transport, local_converter, &registry)
    }

    /// Start with a caller-supplied worker registry (plugin workers).
    pub fn start_with_registry(
        config: &RelayConfig,
        transport: Arc<dyn Transport>,
        local_converter: Option<Arc<dyn ManifestConverter>>,
        registry: &WorkerRegistry,
    ) -> Result<Self> {
        let converter: Arc<dyn ManifestConverter> = if config.converters.is_empty() {
            local_converter.ok_or_else(|| {
                RelayError::Config(
                    "no converter endpoints configured and no in-process converter supplied"
                        .into(),
                )
            })?
        } else {
            Arc::new(ConverterPool::new(config.converters.clone(), CONVERT_TIMEOUT)?)
        };

        let state = Arc::new(SharedState::new(
            config.converters.clone(),
            config.debug_dump,
        ));

        // Unresolvable worker names are fatal before any subscription is
        // made; startup-hook failures are isolated.
        let built = registry.build(&config.workers)?;
        for worker in &built {
            state.add_worker(worker.clone());
        }
        workers::run_startup_hooks(&built);

        let pipeline = ManifestPipeline::new(state.clone(), converter, config.pipeline_threads);
        let reconciler = Arc::new(TopicListReconciler::new(
            state.clone(),
            transport.clone(),
            pipeline.clone(),
        ));

        let startup_gate = Arc::new(Mutex::new(()));
        {
            // Hold the gate for the whole initial subscribe pass.
            let _gate = startup_gate.lock();
            Self::initial_subscribe_pass(&state, &transport, &reconciler, &config.sites);
        }

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        let mut handles = Vec::new();
        handles.push(Self::spawn_status_reporter(
            state.clone(),
            config.status_interval(),
            shutdown_rx.clone(),
        ));
        handles.push(
            ResubscribeTask::new(
                state.clone(),
                transport.clone(),
                reconciler.clone(),
                config.sites.clone(),
            )
            .spawn(config.resubscribe_interval(), shutdown_rx),
        );

        Ok(Self {
            state,
            transport,
            reconciler,
            _pipeline: pipeline,
            startup_gate,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handles: Mutex::new(handles),
            shutdown_started: AtomicBool::new(false),
        })
    }

    /// Subscribe to every site list topic of interest; failures seed the
    /// pending retry set for the resubscribe loop.
    fn initial_subscribe_pass(
        state: &Arc<SharedState>,
        transport: &Arc<dyn Transport>,
        reconciler: &Arc<TopicListReconciler>,
        sites: &[String],
    ) {
        let topics = match transport.list_topics() {
            Ok(topics) => topics,
            Err(e) => {
                warn!("topic listing failed at startup, deferring to resubscribe loop: {e}");
                return;
            }
        };
        info!("subscribing to known site manifest lists");
        for topic in naming::match_site_topics(&topics, sites) {
            info!("  {topic}");
            match transport.subscribe(&topic, reconciler.clone()) {
                Ok(sub) => state.add_subscription(&topic, sub),
                Err(e) => {
                    warn!(topic, "site list subscribe failed, will retry: {e}");
                    state.add_pending_site(topic);
                }
            }
        }
    }

    fn spawn_status_reporter(
        state: Arc<SharedState>,
        interval: Duration,
        shutdown: Receiver<()>,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("status-reporter".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => info!("{state}"),
                        recv(shutdown) -> _ => break,
                    }
                }
            })
            .expect("failed to spawn status reporter")
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Wire this to the transport client's reconnection callback. Tears down
    /// everything that was subscribed and queues it for resubscription; the
    /// periodic loop re-establishes the set against the fresh connection.
    pub fn handle_reconnect(&self) {
        if self.state.is_shutting_down() {
            return;
        }
        let _gate = self.startup_gate.lock();
        info!("transport reconnected, reseeding all subscriptions");

        let mut manifests = Vec::new();
        self.reconciler.unsubscribe_all(Some(&mut manifests));
        for topic in manifests {
            self.state.add_pending_manifest(topic);
        }

        for (topic, sub) in self.state.clear_subscriptions() {
            let _ = self.transport.unsubscribe(&topic, &sub);
            self.state.add_pending_site(topic);
        }
    }

    /// Idempotent, ordered teardown: waits for startup, cancels the
    /// background loops, flips the shutdown flag (new events are dropped
    /// from here on) and unsubscribes everything exactly once.
    pub fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let _gate = self.startup_gate.lock();

        // Cancel the loops and wait for them.
        self.shutdown_tx.lock().take();
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }

        self.state.set_shutting_down();

        info!("shutting down subscriptions");
        self.reconciler.unsubscribe_all(None);
        for (topic, sub) in self.state.clear_subscriptions() {
            info!("  {topic}");
            if let Err(e) = self.transport.unsubscribe(&topic, &sub) {
                warn!(topic, "unsubscribe failed during shutdown: {e}");
            }
        }
        info!("exiting");
    }
}

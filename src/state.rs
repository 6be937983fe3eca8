//! Process-wide shared daemon state.
//!
//! One instance per daemon, constructed explicitly and passed to every
//! component (no global singleton). All registries are safe under concurrent
//! access from transport I/O threads, the resubscribe loop, and shutdown;
//! reads hand out snapshots, never the live collections.

use crate::types::SubId;
use crate::workers::OutputWorker;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Topics known to need a subscription attempt. Site list topics and
/// manifest topics are tracked separately because they resubscribe with
/// different handlers.
#[derive(Default)]
struct PendingRetry {
    sites: HashSet<String>,
    manifests: HashSet<String>,
}

/// Shared registries coordinating the reconciler, the pipeline, the
/// resubscribe loop and shutdown.
pub struct SharedState {
    /// Active subscriptions keyed by topic. At most one per topic.
    subscriptions: Mutex<HashMap<String, SubId>>,
    pending: Mutex<PendingRetry>,
    /// Output workers in registration order.
    workers: Mutex<Vec<Arc<dyn OutputWorker>>>,
    /// Converter endpoints as configured.
    converters: Vec<String>,
    debug_dump: bool,
    events_served: AtomicU64,
    manifest_subscriptions: AtomicU64,
    shutting_down: AtomicBool,
    started: Instant,
}

impl SharedState {
    pub fn new(converters: Vec<String>, debug_dump: bool) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingRetry::default()),
            workers: Mutex::new(Vec::new()),
            converters,
            debug_dump,
            events_served: AtomicU64::new(0),
            manifest_subscriptions: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    // --- Subscription table ---

    /// Record a live subscription. Replaces any stale handle for the topic.
    pub fn add_subscription(&self, topic: impl Into<String>, sub: SubId) {
        self.subscriptions.lock().insert(topic.into(), sub);
    }

    /// Remove and return the handle for a topic, if subscribed.
    pub fn remove_subscription(&self, topic: &str) -> Option<SubId> {
        self.subscriptions.lock().remove(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.lock().contains_key(topic)
    }

    /// Snapshot of the current subscription table.
    pub fn subscriptions(&self) -> Vec<(String, SubId)> {
        self.subscriptions
            .lock()
            .iter()
            .map(|(t, s)| (t.clone(), s.clone()))
            .collect()
    }

    /// Drain the subscription table, returning everything that was active.
    pub fn clear_subscriptions(&self) -> Vec<(String, SubId)> {
        self.subscriptions.lock().drain().collect()
    }

    // --- Pending retry sets ---

    pub fn add_pending_site(&self, topic: impl Into<String>) {
        self.pending.lock().sites.insert(topic.into());
    }

    pub fn add_pending_manifest(&self, topic: impl Into<String>) {
        self.pending.lock().manifests.insert(topic.into());
    }

    pub fn remove_pending_site(&self, topic: &str) {
        self.pending.lock().sites.remove(topic);
    }

    pub fn remove_pending_manifest(&self, topic: &str) {
        self.pending.lock().manifests.remove(topic);
    }

    pub fn is_pending_manifest(&self, topic: &str) -> bool {
        self.pending.lock().manifests.contains(topic)
    }

    pub fn pending_sites(&self) -> Vec<String> {
        self.pending.lock().sites.iter().cloned().collect()
    }

    pub fn pending_manifests(&self) -> Vec<String> {
        self.pending.lock().manifests.iter().cloned().collect()
    }

    // --- Workers ---

    pub fn add_worker(&self, worker: Arc<dyn OutputWorker>) {
        self.workers.lock().push(worker);
    }

    /// Registered workers, in registration order.
    pub fn workers(&self) -> Vec<Arc<dyn OutputWorker>> {
        self.workers.lock().clone()
    }

    // --- Converters / flags ---

    pub fn converters(&self) -> &[String] {
        &self.converters
    }

    pub fn debug_dump(&self) -> bool {
        self.debug_dump
    }

    // --- Counters ---

    pub fn inc_events(&self) {
        self.events_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_served(&self) -> u64 {
        self.events_served.load(Ordering::Relaxed)
    }

    pub fn inc_manifests(&self) {
        self.manifest_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_manifests(&self) {
        // Floor at zero; unsubscribing a topic that never counted must not
        // wrap the counter.
        let _ = self.manifest_subscriptions.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
    }

    pub fn manifest_subscriptions(&self) -> u64 {
        self.manifest_subscriptions.load(Ordering::Relaxed)
    }

    // --- Shutdown flag ---

    /// Flip the shutdown flag. Returns true the first time.
    pub fn set_shutting_down(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl fmt::Display for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "up {}s, {} manifest subscriptions, served {} manifest events",
            self.started.elapsed().as_secs(),
            self.manifest_subscriptions(),
            self.events_served()
        )
    }
}

//! Periodic resubscription of topics that failed to subscribe.
//!
//! Transient subscribe failures (transport hiccup, server restart) leave
//! gaps: a site list we should be watching, or a manifest topic announced in
//! a snapshot but absent from the subscription table. This loop is the sole
//! healer for those gaps and for recovering the full set after a transport
//! reconnect.

use crate::naming;
use crate::reconcile::TopicListReconciler;
use crate::state::SharedState;
use crate::transport::Transport;
use crossbeam_channel::{select, tick, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

pub struct ResubscribeTask {
    state: Arc<SharedState>,
    transport: Arc<dyn Transport>,
    reconciler: Arc<TopicListReconciler>,
    /// Configured site patterns of interest.
    sites: Vec<String>,
}

impl ResubscribeTask {
    pub fn new(
        state: Arc<SharedState>,
        transport: Arc<dyn Transport>,
        reconciler: Arc<TopicListReconciler>,
        sites: Vec<String>,
    ) -> Self {
        Self {
            state,
            transport,
            reconciler,
            sites,
        }
    }

    /// One reconciliation pass: seed the pending sets from the fresh
    /// authoritative topic list, then retry everything pending.
    pub fn run_once(&self) {
        if self.state.is_shutting_down() {
            return;
        }

        // Seed missing site list topics from the authoritative listing. A
        // listing failure is transient; retries below still run.
        match self.transport.list_topics() {
            Ok(topics) => {
                for topic in naming::match_site_topics(&topics, &self.sites) {
                    if !self.state.is_subscribed(&topic) {
                        self.state.add_pending_site(topic);
                    }
                }
            }
            Err(e) => warn!("topic listing failed, retrying pending only: {e}"),
        }

        // Seed manifest topics announced in snapshots but not subscribed.
        for topic in self.reconciler.known_manifest_topics() {
            if !self.state.is_subscribed(&topic) {
                self.state.add_pending_manifest(topic);
            }
        }

        let pending_sites = self.state.pending_sites();
        let pending_manifests = self.state.pending_manifests();
        if pending_sites.is_empty() && pending_manifests.is_empty() {
            return;
        }
        info!(
            sites = pending_sites.len(),
            manifests = pending_manifests.len(),
            "resubscribing pending topics"
        );

        for topic in pending_sites {
            match self.transport.subscribe(&topic, self.reconciler.clone()) {
                Ok(sub) => {
                    info!(topic, "site list resubscribed");
                    self.state.add_subscription(&topic, sub);
                    self.state.remove_pending_site(&topic);
                }
                Err(e) => warn!(topic, "site list resubscribe failed, keeping: {e}"),
            }
        }

        for topic in pending_manifests {
            // retry_manifest re-checks the pending set under the reconciler
            // lock; a topic dropped by a list delta since the snapshot above
            // is skipped.
            if self.reconciler.retry_manifest(&topic) {
                info!(topic, "manifest resubscribed");
            }
        }
    }

    /// Run the periodic loop on its own thread until `shutdown` fires.
    pub fn spawn(self, interval: Duration, shutdown: Receiver<()>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("resubscribe".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => self.run_once(),
                        recv(shutdown) -> _ => break,
                    }
                }
            })
            .expect("failed to spawn resubscribe thread")
    }
}

//! Reconciles manifest subscriptions against published site topic lists.
//!
//! Each site periodically publishes the full list of its manifests. The
//! reconciler diffs every new list against the last snapshot for that site
//! and subscribes/unsubscribes the delta, keeping the shared subscription
//! table consistent with the most recently announced truth. Snapshots are
//! replaced wholesale even when individual subscribe calls fail; healing
//! those gaps is the resubscribe loop's job.

use crate::naming;
use crate::state::SharedState;
use crate::transport::{ItemHandler, Transport};
use crate::types::SubId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TopicListReconciler {
    state: Arc<SharedState>,
    transport: Arc<dyn Transport>,
    /// Entry point of the manifest pipeline; every child topic is subscribed
    /// with this handler.
    manifest_handler: Arc<dyn ItemHandler>,
    /// Last announced manifest-topic set per site list topic. Guarded as a
    /// whole so two events for the same site cannot interleave their diffs.
    site_lists: Mutex<HashMap<String, HashSet<String>>>,
}

impl TopicListReconciler {
    pub fn new(
        state: Arc<SharedState>,
        transport: Arc<dyn Transport>,
        manifest_handler: Arc<dyn ItemHandler>,
    ) -> Self {
        Self {
            state,
            transport,
            manifest_handler,
            site_lists: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe the pipeline to one manifest topic, recording the handle on
    /// success and queueing the topic for retry on failure. Never fatal.
    pub fn subscribe_manifest(&self, topic: &str) -> bool {
        // Shutdown may have flipped the flag after our caller's own check.
        if self.state.is_shutting_down() {
            return false;
        }
        match self
            .transport
            .subscribe(topic, self.manifest_handler.clone())
        {
            Ok(sub) => {
                self.state.add_subscription(topic, sub);
                self.state.inc_manifests();
                self.state.remove_pending_manifest(topic);
                true
            }
            Err(e) => {
                warn!(topic, "manifest subscribe failed, will retry: {e}");
                self.state.add_pending_manifest(topic);
                false
            }
        }
    }

    fn unsubscribe_manifest(&self, topic: &str, sub: Option<SubId>) {
        if let Some(sub) = sub {
            if let Err(e) = self.transport.unsubscribe(topic, &sub) {
                warn!(topic, "unsubscribe failed: {e}");
            }
            self.state.dec_manifests();
        }
        // Whether or not the transport call worked, the topic is no longer
        // of interest.
        self.state.remove_pending_manifest(topic);
    }

    /// Manifest topics currently known from site snapshots.
    pub fn known_manifest_topics(&self) -> Vec<String> {
        let lists = self.site_lists.lock();
        let mut out: Vec<String> = lists.values().flatten().cloned().collect();
        out.sort();
        out.dedup();
        out
    }

    /// Tear down every manifest subscription and forget all snapshots.
    /// Topic names are appended to `save` when provided (reconnect seeding).
    pub fn unsubscribe_all(&self, mut save: Option<&mut Vec<String>>) {
        let mut lists = self.site_lists.lock();
        info!("unsubscribing from all manifests");
        for (topic, sub) in self.state.subscriptions() {
            if naming::parse_manifest_topic(&topic).is_none() {
                continue;
            }
            info!("    {topic}");
            self.state.remove_subscription(&topic);
            self.unsubscribe_manifest(&topic, Some(sub));
            if let Some(ref mut saved) = save {
                saved.push(topic);
            }
        }
        lists.clear();
    }

    fn parse_list_payload(&self, list_topic: &str, payload: &str) -> HashSet<String> {
        let mut set = HashSet::new();
        for line in payload.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match naming::manifest_topic_for(list_topic, line) {
                Some(topic) => {
                    debug!("\t{topic}");
                    set.insert(topic);
                }
                None => warn!(list_topic, entry = line, "dropping malformed list entry"),
            }
        }
        set
    }

    /// Retry one pending manifest subscribe from the resubscribe loop.
    /// Serialized against list deltas: a topic dropped from a site's list
    /// since it was queued (its pending entry cleared under this lock) is
    /// not resubscribed.
    pub fn retry_manifest(&self, topic: &str) -> bool {
        let _lists = self.site_lists.lock();
        if !self.state.is_pending_manifest(topic) {
            return false;
        }
        self.subscribe_manifest(topic)
    }

    fn reconcile(&self, list_topic: &str, new_set: HashSet<String>) {
        // Diff, delta subscribes and snapshot replacement form one critical
        // section per event.
        let mut lists = self.site_lists.lock();

        // An event already past the handler's flag check can land here after
        // shutdown tore everything down; it must not subscribe anew.
        if self.state.is_shutting_down() {
            return;
        }

        match lists.get(list_topic) {
            Some(old_set) => {
                let added: Vec<&String> = new_set.difference(old_set).collect();
                let removed: Vec<&String> = old_set.difference(&new_set).collect();

                for topic in removed {
                    info!("removing manifest subscription {topic}");
                    let sub = self.state.remove_subscription(topic);
                    self.unsubscribe_manifest(topic, sub);
                }
                for topic in added {
                    info!("adding manifest subscription {topic}");
                    self.subscribe_manifest(topic);
                }
            }
            None => {
                for topic in &new_set {
                    info!("adding manifest subscription from clean slate {topic}");
                    self.subscribe_manifest(topic);
                }
            }
        }

        // The snapshot always reflects the latest announced truth,
        // independent of subscription success.
        lists.insert(list_topic.to_string(), new_set);
    }
}

impl ItemHandler for TopicListReconciler {
    fn handle_items(&self, topic: &str, items: &[String]) {
        if self.state.is_shutting_down() {
            return;
        }
        for payload in items {
            info!(topic, "received manifest list event");
            let new_set = self.parse_list_payload(topic, payload);
            self.reconcile(topic, new_set);
        }
    }
}

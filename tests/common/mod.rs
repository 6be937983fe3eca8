//! Shared test doubles for the integration suite.

use manifest_relay::{ItemHandler, RelayConfig, RelayError, Result, SubId, Transport};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// In-memory pub/sub server: records every subscribe/unsubscribe, lets tests
/// deliver publish events to whichever handler is subscribed, and can be
/// scripted to fail subscribes per topic.
#[derive(Default)]
pub struct MockTransport {
    topics: Mutex<Vec<String>>,
    handlers: Mutex<HashMap<String, Arc<dyn ItemHandler>>>,
    fail_topics: Mutex<HashSet<String>>,
    pub subscribes: Mutex<Vec<String>>,
    pub unsubscribes: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(topics: Vec<&str>) -> Arc<Self> {
        let transport = Arc::new(Self::default());
        *transport.topics.lock() = topics.into_iter().map(String::from).collect();
        transport
    }

    /// Add a topic to the server's listing after startup.
    pub fn announce_topic(&self, topic: &str) {
        self.topics.lock().push(topic.to_string());
    }

    pub fn fail_topic(&self, topic: &str) {
        self.fail_topics.lock().insert(topic.to_string());
    }

    pub fn heal(&self) {
        self.fail_topics.lock().clear();
    }

    /// Deliver a publish event to the subscribed handler, as the transport
    /// I/O thread would.
    pub fn deliver(&self, topic: &str, items: &[&str]) {
        let handler = self.handlers.lock().get(topic).cloned();
        let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        if let Some(handler) = handler {
            handler.handle_items(topic, &items);
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.handlers.lock().contains_key(topic)
    }
}

impl Transport for MockTransport {
    fn list_topics(&self) -> Result<Vec<String>> {
        Ok(self.topics.lock().clone())
    }

    fn subscribe(&self, topic: &str, handler: Arc<dyn ItemHandler>) -> Result<SubId> {
        self.subscribes.lock().push(topic.to_string());
        if self.fail_topics.lock().contains(topic) {
            return Err(RelayError::Transport("scripted subscribe failure".into()));
        }
        self.handlers.lock().insert(topic.to_string(), handler);
        Ok(SubId(format!("sub-{topic}")))
    }

    fn unsubscribe(&self, topic: &str, _sub: &SubId) -> Result<()> {
        self.unsubscribes.lock().push(topic.to_string());
        self.handlers.lock().remove(topic);
        Ok(())
    }
}

/// Output worker that forwards each processed manifest to a channel so
/// tests can block on pipeline completion.
pub struct ForwardingWorker {
    required: Vec<manifest_relay::ArtifactKind>,
    tx: crossbeam_channel::Sender<(String, Option<String>)>,
}

impl ForwardingWorker {
    pub fn channel(
        required: Vec<manifest_relay::ArtifactKind>,
    ) -> (
        Arc<Self>,
        crossbeam_channel::Receiver<(String, Option<String>)>,
    ) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { required, tx }), rx)
    }
}

impl manifest_relay::OutputWorker for ForwardingWorker {
    fn name(&self) -> &str {
        "forwarding"
    }

    fn required_artifacts(&self) -> &[manifest_relay::ArtifactKind] {
        &self.required
    }

    fn process_manifest(
        &self,
        artifacts: &manifest_relay::Artifacts,
        site: &manifest_relay::SiteInfo,
    ) -> Result<()> {
        let converted = artifacts
            .get(manifest_relay::ArtifactKind::Converted)
            .map(String::from);
        let _ = self.tx.send((site.urn.clone(), converted));
        Ok(())
    }
}

/// Minimal valid configuration with background loops effectively disabled.
pub fn test_config() -> RelayConfig {
    RelayConfig::from_toml_str(
        r#"
        resubscribe_interval_secs = 3600
        status_interval_secs = 3600
        pipeline_threads = 2

        [transport]
        server = "pubsub.example.net:5222"
        login = "relay"
    "#,
    )
    .unwrap()
}

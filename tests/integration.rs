//! End-to-end tests for the relay daemon against an in-memory transport.

mod common;

use common::{test_config, ForwardingWorker, MockTransport};
use manifest_relay::{
    encode_manifest, ArtifactKind, Daemon, InProcessConverter, ManifestConverter, OutputWorker,
    WorkerRegistry,
};
use std::sync::Arc;
use std::time::Duration;

const RDU_LIST: &str = "/federation/site/rdu---abcd/manifestList";
const UNC_LIST: &str = "/federation/site/unc---efgh/manifestList";

fn rdu_manifest(urn: &str, uuid: &str) -> String {
    format!("/federation/site/rdu---abcd/{urn}---{uuid}/manifest")
}

fn list_entry(urn: &str, uuid: &str) -> String {
    format!("{urn}/{uuid}/owner/active/0")
}

fn rspec_converter() -> Option<Arc<dyn ManifestConverter>> {
    Some(Arc::new(InProcessConverter::new(|manifest, _urn| {
        Ok(format!("<rspec from={:?}/>", manifest.len()))
    })))
}

#[test]
fn startup_subscribes_all_matching_site_lists() {
    let transport = MockTransport::new(vec![RDU_LIST, UNC_LIST, "/weather/forecasts"]);
    let daemon = Daemon::start(&test_config(), transport.clone(), rspec_converter()).unwrap();

    assert!(daemon.state().is_subscribed(RDU_LIST));
    assert!(daemon.state().is_subscribed(UNC_LIST));
    assert!(!daemon.state().is_subscribed("/weather/forecasts"));
    daemon.shutdown();
}

#[test]
fn site_patterns_restrict_subscriptions() {
    let transport = MockTransport::new(vec![RDU_LIST, UNC_LIST]);
    let mut config = test_config();
    config.sites = vec!["rdu".to_string()];
    let daemon = Daemon::start(&config, transport.clone(), rspec_converter()).unwrap();

    assert!(daemon.state().is_subscribed(RDU_LIST));
    assert!(!daemon.state().is_subscribed(UNC_LIST));
    daemon.shutdown();
}

#[test]
fn site_list_announcement_drives_manifest_subscriptions() {
    let transport = MockTransport::new(vec![RDU_LIST]);
    let daemon = Daemon::start(&test_config(), transport.clone(), rspec_converter()).unwrap();

    transport.deliver(
        RDU_LIST,
        &[&format!("{}\n{}", list_entry("a", "1"), list_entry("b", "2"))],
    );
    assert!(daemon.state().is_subscribed(&rdu_manifest("a", "1")));
    assert!(daemon.state().is_subscribed(&rdu_manifest("b", "2")));
    assert_eq!(daemon.state().manifest_subscriptions(), 2);

    // Next announcement drops a, keeps b, adds c.
    transport.deliver(
        RDU_LIST,
        &[&format!("{}\n{}", list_entry("b", "2"), list_entry("c", "3"))],
    );
    assert!(!daemon.state().is_subscribed(&rdu_manifest("a", "1")));
    assert!(daemon.state().is_subscribed(&rdu_manifest("b", "2")));
    assert!(daemon.state().is_subscribed(&rdu_manifest("c", "3")));
    assert_eq!(daemon.state().manifest_subscriptions(), 2);
    assert_eq!(
        transport.unsubscribes.lock().clone(),
        vec![rdu_manifest("a", "1")]
    );
    daemon.shutdown();
}

#[test]
fn manifest_event_flows_through_pipeline_to_worker() {
    let transport = MockTransport::new(vec![RDU_LIST]);
    let (worker, processed) = ForwardingWorker::channel(vec![ArtifactKind::Converted]);

    let mut config = test_config();
    config.workers = vec!["forwarding".to_string()];
    let mut registry = WorkerRegistry::empty();
    registry.register("forwarding", move || worker.clone() as Arc<dyn OutputWorker>);

    let daemon =
        Daemon::start_with_registry(&config, transport.clone(), rspec_converter(), &registry)
            .unwrap();

    transport.deliver(RDU_LIST, &[&list_entry("web", "1111")]);
    let payload = encode_manifest("<ndl/>").unwrap();
    transport.deliver(&rdu_manifest("web", "1111"), &[&payload]);

    let (urn, converted) = processed.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(urn, "web");
    assert!(converted.unwrap().starts_with("<rspec"));
    assert_eq!(daemon.state().events_served(), 1);
    daemon.shutdown();
}

#[test]
fn shutdown_tears_down_children_then_parents_exactly_once() {
    let transport = MockTransport::new(vec![RDU_LIST]);
    let daemon = Daemon::start(&test_config(), transport.clone(), rspec_converter()).unwrap();
    transport.deliver(
        RDU_LIST,
        &[&format!("{}\n{}", list_entry("a", "1"), list_entry("b", "2"))],
    );

    daemon.shutdown();
    daemon.shutdown();

    let unsubscribed = transport.unsubscribes.lock().clone();
    assert_eq!(unsubscribed.len(), 3);
    // Children first, parent last.
    assert_eq!(unsubscribed[2], RDU_LIST);
    assert!(daemon.state().subscriptions().is_empty());

    // Events arriving after shutdown are dropped.
    let served = daemon.state().events_served();
    transport.deliver(RDU_LIST, &[&list_entry("c", "3")]);
    assert_eq!(daemon.state().events_served(), served);
}

//! # Manifest Relay
//!
//! A long-running daemon that watches federated pub/sub servers for site
//! manifest announcements and relays every manifest through a processing
//! pipeline.
//!
//! ## Core Concepts
//!
//! - **Site lists**: Each site publishes the full list of its manifests;
//!   the reconciler diffs each announcement and adjusts subscriptions
//! - **Manifests**: Compressed, encoded payloads published per manifest
//!   topic; decoded and converted by a thread pool
//! - **Workers**: Pluggable output stages that receive the decoded and
//!   converted artifacts
//! - **Resubscription**: A periodic loop that heals subscription gaps and
//!   recovers after transport reconnects
//!
//! ## Example
//!
//! ```ignore
//! use manifest_relay::{Daemon, RelayConfig};
//!
//! let config = RelayConfig::from_path("relay.toml")?;
//! let transport = connect_transport(&config.transport)?;
//!
//! let daemon = Daemon::start(&config, transport, None)?;
//! // ... until the process is told to stop ...
//! daemon.shutdown();
//! ```

pub mod codec;
pub mod config;
pub mod convert;
pub mod daemon;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod reconcile;
pub mod resubscribe;
pub mod state;
pub mod transport;
pub mod types;
pub mod workers;

// Re-exports
pub use codec::{decode_manifest, encode_manifest};
pub use config::{RelayConfig, TransportConfig};
pub use convert::{ConverterPool, InProcessConverter, ManifestConverter};
pub use daemon::Daemon;
pub use error::{RelayError, Result};
pub use pipeline::ManifestPipeline;
pub use reconcile::TopicListReconciler;
pub use resubscribe::ResubscribeTask;
pub use state::SharedState;
pub use transport::{ItemHandler, Transport};
pub use types::{ArtifactKind, Artifacts, ManifestJob, SiteInfo, SubId};
pub use workers::{LoggingWorker, OutputWorker, PublishWorker, WorkerRegistry};

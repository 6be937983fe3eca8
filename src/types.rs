//! Core types for the relay daemon.

use std::collections::HashMap;
use std::fmt;

/// Opaque subscription handle returned by the transport on a successful
/// subscribe. A topic has at most one live handle at a time.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubId(pub String);

impl fmt::Debug for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubId({})", self.0)
    }
}

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifiers recovered from a manifest topic name: which manifest this is
/// and which site (federation member) published it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteInfo {
    /// Manifest URN (human-readable name).
    pub urn: String,
    /// Manifest UUID.
    pub uuid: String,
    /// Name of the publishing site.
    pub sm_name: String,
    /// GUID of the publishing site.
    pub sm_guid: String,
}

impl fmt::Display for SiteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) from {}", self.urn, self.uuid, self.sm_name)
    }
}

/// The artifact forms a manifest passes through in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// As received on the wire: compressed and text-encoded.
    Compressed,
    /// Decoded and decompressed semantic form.
    Decoded,
    /// Output of the converter.
    Converted,
}

impl ArtifactKind {
    /// Stage name used for debug dump file names.
    pub fn stage(&self) -> &'static str {
        match self {
            ArtifactKind::Compressed => "raw",
            ArtifactKind::Decoded => "decoded",
            ArtifactKind::Converted => "converted",
        }
    }
}

/// The artifacts produced for one manifest job, keyed by kind.
///
/// Workers declare which kinds they require; dispatch skips a worker when a
/// required kind is absent (e.g. `Converted` after a conversion failure).
#[derive(Clone, Debug, Default)]
pub struct Artifacts {
    inner: HashMap<ArtifactKind, String>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ArtifactKind, payload: String) {
        self.inner.insert(kind, payload);
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&str> {
        self.inner.get(&kind).map(|s| s.as_str())
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.inner.contains_key(&kind)
    }
}

/// Immutable unit of pipeline work, created when a manifest-publish event
/// arrives and consumed exactly once by one pipeline run.
#[derive(Clone, Debug)]
pub struct ManifestJob {
    /// Compressed, text-encoded payload as published.
    pub payload: String,
    /// Identifiers parsed from the origin topic.
    pub site: SiteInfo,
    /// Topic the manifest was published on.
    pub origin_topic: String,
}

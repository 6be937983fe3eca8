//! Topic naming convention for the manifest federation.
//!
//! Every site publishes its list of manifests on a well-known list topic;
//! each manifest then gets its own child topic derived from a list entry:
//!
//! - list topic:     `/federation/site/<name>---<guid>/manifestList`
//! - manifest topic: `/federation/site/<name>---<guid>/<urn>---<uuid>/manifest`
//!
//! List payloads are newline-delimited entries of exactly five
//! slash-separated fields: `urn/uuid/owner/state/flags`. Malformed entries
//! are dropped, not fatal.

use crate::types::SiteInfo;

/// Namespace all federation topics live under.
pub const TOPIC_PREFIX: &str = "/federation/site/";

/// Final path segment of a site's manifest-list topic.
pub const LIST_SEGMENT: &str = "manifestList";

/// Final path segment of a manifest topic.
pub const MANIFEST_SEGMENT: &str = "manifest";

/// Whether a topic is a site manifest-list topic.
pub fn is_site_list_topic(topic: &str) -> bool {
    topic
        .strip_prefix(TOPIC_PREFIX)
        .and_then(|rest| rest.strip_suffix(LIST_SEGMENT))
        .and_then(|site| site.strip_suffix('/'))
        .map(|site| site.contains("---") && !site.contains('/'))
        .unwrap_or(false)
}

/// Derive the manifest topic name for one list entry, relative to the list
/// topic it was announced on. Returns `None` for malformed entries.
pub fn manifest_topic_for(list_topic: &str, entry: &str) -> Option<String> {
    let base = list_topic.strip_suffix(LIST_SEGMENT)?;

    let fields: Vec<&str> = entry.split('/').collect();
    if fields.len() != 5 {
        return None;
    }
    let urn = fields[0].trim();
    let uuid = fields[1].trim();
    if urn.is_empty() || uuid.is_empty() {
        return None;
    }

    Some(format!("{base}{urn}---{uuid}/{MANIFEST_SEGMENT}"))
}

/// Parse a manifest topic name back into site identifiers. Returns `None`
/// when the topic does not match the expected shape.
pub fn parse_manifest_topic(topic: &str) -> Option<SiteInfo> {
    let rest = topic.trim().strip_prefix(TOPIC_PREFIX)?;
    let rest = rest.strip_suffix(MANIFEST_SEGMENT)?.strip_suffix('/')?;

    let (site_seg, manifest_seg) = rest.split_once('/')?;
    let (sm_name, sm_guid) = site_seg.split_once("---")?;
    let (urn, uuid) = manifest_seg.split_once("---")?;

    if sm_name.is_empty() || sm_guid.is_empty() || urn.is_empty() || uuid.is_empty() {
        return None;
    }

    Some(SiteInfo {
        urn: urn.to_string(),
        uuid: uuid.to_string(),
        sm_name: sm_name.to_string(),
        sm_guid: sm_guid.to_string(),
    })
}

/// Select the site list topics of interest out of an authoritative topic
/// listing. A topic is of interest when its site name starts with one of the
/// configured patterns; an empty pattern list (or an empty pattern) matches
/// every site. Each topic is matched against patterns in configuration order
/// and claimed by the first match, so overlapping patterns cannot produce
/// duplicates.
pub fn match_site_topics(all_topics: &[String], patterns: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for topic in all_topics {
        if !is_site_list_topic(topic) {
            continue;
        }
        let site = topic
            .strip_prefix(TOPIC_PREFIX)
            .and_then(|r| r.split('/').next())
            .unwrap_or_default();
        let matched = if patterns.is_empty() {
            true
        } else {
            patterns.iter().any(|p| site.starts_with(p.trim()))
        };
        if matched && !out.contains(topic) {
            out.push(topic.clone());
        }
    }
    out
}

//! # Agent Cache (C3)
//!
//! A concurrent map from agent identifier to its last-known hostname,
//! attributes, and last-seen timestamp. Informational only: authoritative
//! state is re-issued by the outer resource manager on every offer, so the
//! cache never blocks a matching decision and is never treated as a source
//! of truth for constraint satisfaction (the offer's own attributes are
//! used for that; see [`crate::domain::offer::Offer::attribute_set`]).

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::offer::AttributeMap;
use crate::domain::task::AgentId;

#[derive(Debug, Clone)]
pub struct AgentCacheEntry {
    pub hostname: String,
    pub attributes: AttributeMap,
    pub last_seen: DateTime<Utc>,
}

/// Update is idempotent and last-write-wins; lookup is non-blocking
/// (spec §4.3).
#[derive(Debug, Default)]
pub struct AgentCache {
    entries: DashMap<AgentId, AgentCacheEntry>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, agent_id: AgentId, hostname: String, attributes: AttributeMap) {
        self.entries.insert(
            agent_id,
            AgentCacheEntry {
                hostname,
                attributes,
                last_seen: Utc::now(),
            },
        );
    }

    pub fn lookup(&self, agent_id: &str) -> Option<AgentCacheEntry> {
        self.entries.get(agent_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn update_then_lookup_round_trips() {
        let cache = AgentCache::new();
        let mut attrs = BTreeMap::new();
        attrs.insert("role".to_string(), "FLP".to_string());
        cache.update("agent-1".to_string(), "flp01.local".to_string(), attrs.clone());

        let entry = cache.lookup("agent-1").expect("entry should be present");
        assert_eq!(entry.hostname, "flp01.local");
        assert_eq!(entry.attributes, attrs);
    }

    #[test]
    fn lookup_of_unknown_agent_is_none() {
        let cache = AgentCache::new();
        assert!(cache.lookup("nope").is_none());
    }

    #[test]
    fn update_is_last_write_wins() {
        let cache = AgentCache::new();
        cache.update("agent-1".to_string(), "first".to_string(), BTreeMap::new());
        cache.update("agent-1".to_string(), "second".to_string(), BTreeMap::new());
        assert_eq!(cache.lookup("agent-1").unwrap().hostname, "second");
        assert_eq!(cache.len(), 1);
    }
}

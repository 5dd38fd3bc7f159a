//! Offers: ephemeral, per-cycle resource grants from the outer resource
//! manager. Never stored across cycles (spec §3).

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use crate::domain::task::AgentId;

pub type OfferId = String;

/// An attribute value on an offer's agent, used to satisfy descriptor
/// constraints. Only string-valued attributes are modeled; the outer
/// manager's scalar/range/set attribute kinds beyond plain strings are out
/// of scope for matching.
pub type AttributeMap = BTreeMap<String, String>;

/// The resources an offer grants: scalar CPU/memory and a set of available
/// port ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBundle {
    pub cpus: f64,
    pub memory_mib: u64,
    pub port_ranges: Vec<RangeInclusive<u32>>,
}

impl ResourceBundle {
    pub fn new(cpus: f64, memory_mib: u64, port_ranges: Vec<RangeInclusive<u32>>) -> Self {
        Self {
            cpus,
            memory_mib,
            port_ranges,
        }
    }

    /// `true` iff this bundle has at least `cpus`/`memory_mib` available.
    pub fn covers_scalars(&self, cpus: f64, memory_mib: u64) -> bool {
        self.cpus >= cpus && self.memory_mib >= memory_mib
    }

    /// Total count of distinct ports available across all ranges.
    pub fn port_count(&self) -> u64 {
        self.port_ranges
            .iter()
            .map(|r| u64::from(*r.end() - *r.start()) + 1)
            .sum()
    }

    /// The minimum available port strictly above `floor`, if any, without
    /// mutating the bundle.
    pub fn min_port_above(&self, floor: u32) -> Option<u32> {
        self.port_ranges
            .iter()
            .filter_map(|r| {
                let candidate = (*r.start()).max(floor.saturating_add(1));
                (candidate <= *r.end()).then_some(candidate)
            })
            .min()
    }

    /// Remove `port` from the available ranges, splitting or shrinking a
    /// range as needed. No-op if the port is not present.
    pub fn take_port(&mut self, port: u32) {
        let mut result = Vec::with_capacity(self.port_ranges.len() + 1);
        for range in self.port_ranges.drain(..) {
            if !range.contains(&port) {
                result.push(range);
                continue;
            }
            let (start, end) = (*range.start(), *range.end());
            if start < port {
                result.push(start..=port - 1);
            }
            if port < end {
                result.push(port + 1..=end);
            }
        }
        self.port_ranges = result;
    }

    pub fn subtract_scalars(&mut self, cpus: f64, memory_mib: u64) {
        self.cpus -= cpus;
        self.memory_mib -= memory_mib;
    }
}

/// An ephemeral per-cycle offer (spec §3). Never persisted past the OFFERS
/// handler that produced it.
#[derive(Debug, Clone)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub attributes: AttributeMap,
    pub resources: ResourceBundle,
}

impl Offer {
    /// Attribute set as the flat constraint-matching view (spec §4.7 step
    /// 3a); currently identical to `attributes` but kept distinct so
    /// richer attribute kinds (ranges, sets) can be added without
    /// disturbing callers.
    pub fn attribute_set(&self) -> BTreeSet<(&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

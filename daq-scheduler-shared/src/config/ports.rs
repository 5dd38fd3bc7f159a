//! Port allocation floors (spec §6, §9 — made configuration rather than
//! the hard-coded constants of the original implementation).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortFloorsConfig {
    /// Named "control" dynamic port allocation never picks below this.
    #[serde(default = "PortFloorsConfig::default_control_floor")]
    pub control_port_floor: u32,
    /// Any other named dynamic port allocation never picks below this.
    #[serde(default = "PortFloorsConfig::default_dynamic_floor")]
    pub dynamic_port_floor: u32,
}

impl PortFloorsConfig {
    fn default_control_floor() -> u32 {
        47100
    }

    fn default_dynamic_floor() -> u32 {
        8999
    }
}

impl Default for PortFloorsConfig {
    fn default() -> Self {
        Self {
            control_port_floor: Self::default_control_floor(),
            dynamic_port_floor: Self::default_dynamic_floor(),
        }
    }
}

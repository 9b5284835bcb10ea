//! Agent configuration.

use serde::Deserialize;

/// Configuration for the forwarding agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// SDK device unit.
    pub unit: i32,
    /// Whether host routes (/32, /128) may be programmed into the
    /// hardware host table instead of the LPM table. Platform property.
    pub use_host_table_for_host_routes: bool,
    /// Router lifetime advertised in RAs, seconds.
    pub ra_router_lifetime: u16,
    /// Hop limit advertised in RAs.
    pub ra_hop_limit: u8,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            unit: 0,
            use_host_table_for_host_routes: false,
            ra_router_lifetime: 1800,
            ra_hop_limit: 64,
        }
    }
}

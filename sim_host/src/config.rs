//! Simulation configuration

use serde::{Deserialize, Serialize};

/// Tunables shared by every host in one simulation
///
/// Every field may be omitted from JSON and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Scheduling slots each host hands out per tick
    pub process_quota: usize,
    /// PIDs are drawn from `[1, pid_ceiling)`
    pub pid_ceiling: u32,
    /// TTYs below this value are kept for local consoles
    pub tty_reserved: u16,
    /// TTYs are drawn from `[tty_reserved, tty_ceiling)`
    pub tty_ceiling: u16,
    /// First uid handed out by account administration
    pub first_uid: u32,
    /// First gid handed out by account administration
    pub first_gid: u32,
    /// Longest line the line editor accepts
    pub line_cap: usize,
    /// Longest chain of processes a packet may be relayed through
    pub max_relay_depth: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            process_quota: 8,
            pid_ceiling: 65535,
            tty_reserved: 64,
            tty_ceiling: 256,
            first_uid: 1000,
            first_gid: 1000,
            line_cap: 100,
            max_relay_depth: 32,
        }
    }
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

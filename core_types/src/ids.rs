//! Unique identifiers for simulation entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a host
///
/// Hosts live in the simulation's host registry keyed by this id. Every
/// cross-host reference (default gateway, address table slot) stores a
/// `HostId`, never a reference, so a removed host simply fails lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    /// Creates a new random host ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a host ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host({})", self.0)
    }
}

/// Opaque identifier handed to a user when a process hits an internal fault
///
/// The full diagnostic report is stored under this id; the user only ever
/// sees the id itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(Uuid);

impl IncidentId {
    /// Creates a new random incident ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Process identifier, unique within one host while the process is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(u32);

impl Pid {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical terminal slot on a host
///
/// Slots below the host's reserved floor are kept for non-network
/// connections; a process without a terminal carries `None` rather than a
/// sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tty(u16);

impl Tty {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Tty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

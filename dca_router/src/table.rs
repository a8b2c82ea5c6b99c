//! Address slot allocation

use crate::dca::PARTITION_LIMIT;
use core_types::HostId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Maps one partition's slots to the hosts occupying them
///
/// Slots run over `[1, 65535)`; slot 0 belongs to the owning node itself.
/// Allocation scans a ring starting just past the last slot handed out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredTable")]
pub struct AddressTable {
    slots: BTreeMap<u16, HostId>,
    #[serde(skip)]
    owners: HashMap<HostId, u16>,
    cursor: u16,
}

#[derive(Deserialize)]
struct StoredTable {
    slots: BTreeMap<u16, HostId>,
    cursor: u16,
}

impl From<StoredTable> for AddressTable {
    fn from(stored: StoredTable) -> Self {
        let owners = stored.slots.iter().map(|(slot, host)| (*host, *slot)).collect();
        Self {
            slots: stored.slots,
            owners,
            cursor: stored.cursor,
        }
    }
}

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `host` a free slot, releasing any slot it already holds
    ///
    /// Returns `None` when every slot is taken.
    pub fn assign(&mut self, host: HostId) -> Option<u16> {
        let previous = self.release(host);
        let span = PARTITION_LIMIT - 1;
        for step in 1..=span {
            let slot = (self.cursor as u32 + step as u32 - 1) % span as u32 + 1;
            let slot = slot as u16;
            if !self.slots.contains_key(&slot) {
                self.slots.insert(slot, host);
                self.owners.insert(host, slot);
                self.cursor = slot;
                return Some(slot);
            }
        }
        if let Some(slot) = previous {
            self.slots.insert(slot, host);
            self.owners.insert(host, slot);
        }
        None
    }

    /// Frees the slot held by `host`
    pub fn release(&mut self, host: HostId) -> Option<u16> {
        let slot = self.slot_of(host)?;
        self.slots.remove(&slot);
        self.owners.remove(&host);
        Some(slot)
    }

    pub fn get(&self, slot: u16) -> Option<HostId> {
        self.slots.get(&slot).copied()
    }

    pub fn slot_of(&self, host: HostId) -> Option<u16> {
        self.owners.get(&host).copied()
    }

    /// Last slot handed out
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, HostId)> + '_ {
        self.slots.iter().map(|(slot, host)| (*slot, *host))
    }
}

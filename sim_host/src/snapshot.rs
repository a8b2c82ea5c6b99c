//! Administrative host checkpoints

use crate::error::SnapshotError;
use crate::host::Host;
use crate::simulation::Simulation;
use core_types::HostId;
use std::fs;
use std::path::Path;
use tracing::info;

impl Simulation {
    pub fn save_host(&self, id: HostId) -> Result<Vec<u8>, SnapshotError> {
        self.host(id).ok_or(SnapshotError::HostNotFound(id))?.save()
    }

    /// Registers a host from a snapshot, powered off
    ///
    /// Fails with [`SnapshotError::Duplicate`] if the id is already loaded.
    pub fn load_host(&mut self, bytes: &[u8]) -> Result<HostId, SnapshotError> {
        let host = Host::load(bytes)?;
        let id = host.id();
        if self.hosts.contains_key(&id) {
            return Err(SnapshotError::Duplicate(id));
        }
        self.hosts.insert(id, host);
        self.order.push(id);
        info!(host = %id, "host restored");
        Ok(id)
    }

    pub fn save_host_to(&self, id: HostId, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let bytes = self.save_host(id)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_host_from(&mut self, path: impl AsRef<Path>) -> Result<HostId, SnapshotError> {
        let bytes = fs::read(path)?;
        self.load_host(&bytes)
    }
}

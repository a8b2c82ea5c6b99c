//! The simulation context
//!
//! One [`Simulation`] owns every host, the top-level address table, the
//! program table and the collaborators. Nothing is global, so independent
//! simulations can run side by side.

use crate::config::SimulationConfig;
use crate::host::Host;
use crate::process::{Link, Process, ProcessCore, ProcessSpec};
use crate::program::{Runnable, Wait};
use crate::programs::ProgramTable;
use core_types::{HostId, Pid, Tty};
use dca_router::AddressTable;
use fs_guard::{PasswdEntry, SUPERUSER};
use host_api::{
    AccountDirectory, Duration, IncidentSink, Instant, MemoryIncidentSink, OsError, ValueError,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct Simulation {
    config: SimulationConfig,
    clock: Instant,
    pub(crate) hosts: HashMap<HostId, Host>,
    /// Registry order; hosts are updated in this order each tick
    pub(crate) order: Vec<HostId>,
    /// Top-level `p` partition of the address space
    ///
    /// Owned here rather than by any ISP node. `assign_isp` draws ISP slots
    /// from it and `release_address` returns them for hosts without a
    /// gateway.
    pub(crate) isp_table: AddressTable,
    programs: ProgramTable,
    accounts: Box<dyn AccountDirectory>,
    pub(crate) incidents: Box<dyn IncidentSink>,
}

impl Simulation {
    /// Creates an empty simulation at [`Instant::EPOCH`]
    ///
    /// Incidents go to an in-memory sink until
    /// [`Simulation::with_incident_sink`] replaces it.
    pub fn new(config: SimulationConfig, accounts: impl AccountDirectory + 'static) -> Self {
        Self {
            config,
            clock: Instant::EPOCH,
            hosts: HashMap::new(),
            order: Vec::new(),
            isp_table: AddressTable::new(),
            programs: ProgramTable::new(),
            accounts: Box::new(accounts),
            incidents: Box::new(MemoryIncidentSink::new()),
        }
    }

    pub fn with_programs(mut self, programs: ProgramTable) -> Self {
        self.programs = programs;
        self
    }

    pub fn with_incident_sink(mut self, sink: impl IncidentSink + 'static) -> Self {
        self.incidents = Box::new(sink);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn now(&self) -> Instant {
        self.clock
    }

    pub fn advance_time(&mut self, by: Duration) {
        self.clock = self.clock + by;
    }

    pub fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramTable {
        &mut self.programs
    }

    pub fn accounts(&self) -> &dyn AccountDirectory {
        self.accounts.as_ref()
    }

    // Host registry

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.hosts.get_mut(&id)
    }

    /// Host ids in registry order
    pub fn host_ids(&self) -> &[HostId] {
        &self.order
    }

    pub fn find_host(&self, hostname: &str) -> Option<HostId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.hosts.get(id).is_some_and(|h| h.hostname() == hostname))
    }

    /// Registers a powered-off host with a fresh filesystem skeleton
    pub fn create_host(&mut self, hostname: &str) -> Result<HostId, ValueError> {
        let host = Host::new(hostname, &self.config, self.clock)?;
        let id = host.id();
        self.hosts.insert(id, host);
        self.order.push(id);
        info!(host = %id, hostname, "host created");
        Ok(id)
    }

    /// Shuts a host down, releases its address and drops it
    pub fn remove_host(&mut self, id: HostId) -> Option<Host> {
        if !self.hosts.contains_key(&id) {
            return None;
        }
        self.shutdown(id);
        self.release_address(id);
        self.order.retain(|h| *h != id);
        info!(host = %id, "host removed");
        self.hosts.remove(&id)
    }

    pub fn startup(&mut self, id: HostId, safemode: bool) -> bool {
        let now = self.clock;
        let Some(host) = self.hosts.get_mut(&id) else {
            return false;
        };
        host.power_on(safemode, now);
        info!(host = %id, safemode, "host powered on");
        true
    }

    /// Kills every process, running each one's cleanup, and powers off
    pub fn shutdown(&mut self, id: HostId) -> bool {
        let Some(host) = self.hosts.get_mut(&id) else {
            return false;
        };
        if let Some(running) = host.running.as_mut() {
            running.killed = true;
        }
        let pids: Vec<Pid> = host.processes.keys().copied().collect();
        for pid in pids {
            self.kill(Link::new(id, pid));
        }
        if let Some(host) = self.hosts.get_mut(&id) {
            host.queue.clear();
            host.power_off();
        }
        info!(host = %id, "host powered off");
        true
    }

    // Processes

    /// Starts `program` on an online host
    ///
    /// The group defaults to the user's primary group on that host, falling
    /// back to a group named after the user. Returns `None` when the host is
    /// missing, offline, or out of PIDs.
    pub fn start(
        &mut self,
        host_id: HostId,
        spec: ProcessSpec,
        program: Box<dyn Runnable>,
    ) -> Option<Pid> {
        let now = self.clock;
        let host = self.hosts.get_mut(&host_id)?;
        if !host.is_online() {
            debug!(host = %host_id, program = program.name(), "start refused: host offline");
            return None;
        }
        let Some(pid) = host.request_pid() else {
            warn!(host = %host_id, "no free pid");
            return None;
        };
        let group = spec
            .group
            .clone()
            .or_else(|| host.fs().primary_group(&spec.user))
            .unwrap_or_else(|| spec.user.clone());
        let core = ProcessCore::new(pid, program.name(), spec, group, now);
        info!(
            host = %host_id,
            pid = %pid,
            program = %core.name,
            user = %core.user,
            "process started"
        );
        host.closed.remove(&pid);
        host.processes.insert(pid, Process { core, program });
        host.queue.push_back(pid);
        Some(pid)
    }

    /// State of a process that is not mid-step
    pub fn process(&self, link: Link) -> Option<&ProcessCore> {
        self.hosts.get(&link.host)?.process(link.pid)
    }

    pub fn process_wait(&self, link: Link) -> Option<Wait> {
        self.hosts.get(&link.host)?.process_wait(link.pid)
    }

    pub fn is_live(&self, link: Link) -> bool {
        self.hosts
            .get(&link.host)
            .is_some_and(|h| h.is_live(link.pid))
    }

    pub(crate) fn process_mut(&mut self, link: Link) -> Option<&mut Process> {
        self.hosts.get_mut(&link.host)?.processes.get_mut(&link.pid)
    }

    pub fn request_tty(&mut self, host: HostId) -> Option<Tty> {
        let tty = self.hosts.get_mut(&host)?.request_tty();
        if tty.is_none() {
            warn!(host = %host, "unable to procure free tty");
        }
        tty
    }

    /// Kills on behalf of `user`; only the owner or the superuser may
    pub fn kill_as(&mut self, link: Link, user: &str) -> Result<(), OsError> {
        let owner = self
            .hosts
            .get(&link.host)
            .and_then(|h| h.owner_of(link.pid))
            .ok_or(OsError::NoSuchProcess)?;
        if owner != user && !self.is_superuser(user) {
            return Err(OsError::PermissionDenied);
        }
        self.kill(link);
        Ok(())
    }

    /// Writes a registered program's image into `/bin` on `host`
    pub fn install_program(&mut self, host: HostId, name: &str) -> Result<(), OsError> {
        let host = self.hosts.get_mut(&host).ok_or(OsError::NotFound)?;
        host.install_program(&self.programs, name)
    }

    // Accounts

    /// True for the host-local superuser and for administrator accounts
    pub fn is_superuser(&self, user: &str) -> bool {
        user == SUPERUSER
            || self
                .accounts
                .find_account(user)
                .is_some_and(|a| a.is_superuser())
    }

    /// True if `user` has an account, a passwd record on `host`, and
    /// `candidate` is their password
    pub fn check_pass(&self, host: HostId, user: &str, candidate: &str) -> bool {
        let Some(account) = self.accounts.find_account(user) else {
            return false;
        };
        self.hosts
            .get(&host)
            .is_some_and(|h| h.fs().check_user(user))
            && account.check_password(candidate)
    }

    /// Adds a local user for an existing account
    pub fn add_user(
        &mut self,
        host: HostId,
        caller: &str,
        username: &str,
    ) -> Result<PasswdEntry, OsError> {
        let host = self.hosts.get_mut(&host).ok_or(OsError::NotFound)?;
        host.fs_mut()
            .add_user(caller, username, self.accounts.as_ref())
    }
}

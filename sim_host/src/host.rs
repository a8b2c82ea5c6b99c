//! The simulated computer
//!
//! A host owns its filesystem, its process table and its place in the
//! address hierarchy. Power state and processes are runtime-only; everything
//! else survives a snapshot.

use crate::config::SimulationConfig;
use crate::error::SnapshotError;
use crate::input::TerminalOutput;
use crate::process::{InFlight, Origin, Process, ProcessCore};
use crate::program::Wait;
use crate::programs::ProgramTable;
use core_types::{HostId, Pid, Tty};
use dca_router::{Dca, NetworkNode, NodeRole};
use fs_guard::{Filesystem, PathResolver, WriteMode, SUPERUSER};
use host_api::{Duration, Instant, OsError, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Longest hostname accepted
pub const HOSTNAME_MAX: usize = 32;

/// Directory installed programs live in
pub const BIN_DIR: &str = "/bin";

#[derive(Serialize, Deserialize)]
pub struct Host {
    id: HostId,
    hostname: String,
    /// Landline number, if the host has one
    pub phone: Option<String>,
    /// Hardware description, e.g. `cpu` → `"8MHz"`
    pub specs: BTreeMap<String, String>,
    pub location: Option<String>,
    created_at: Instant,
    online_since: Option<Instant>,
    pub(crate) dca: Option<Dca>,
    pub(crate) gateway: Option<HostId>,
    pub(crate) role: NodeRole,
    #[serde(skip)]
    online: bool,
    #[serde(skip)]
    safemode: bool,
    fs: Filesystem,
    #[serde(skip)]
    pub(crate) processes: HashMap<Pid, Process>,
    /// Round-robin order of live pids; may hold stale entries
    #[serde(skip)]
    pub(crate) queue: VecDeque<Pid>,
    #[serde(skip)]
    pub(crate) running: Option<InFlight>,
    /// Undelivered output of terminal sessions that have ended
    #[serde(skip)]
    pub(crate) closed: HashMap<Pid, (TerminalOutput, u16)>,
    next_pid: u32,
    pid_ceiling: u32,
    next_tty: u16,
    tty_reserved: u16,
    tty_ceiling: u16,
}

impl Host {
    pub(crate) fn new(
        hostname: &str,
        config: &SimulationConfig,
        now: Instant,
    ) -> Result<Self, ValueError> {
        validate_hostname(hostname)?;
        Ok(Self {
            id: HostId::new(),
            hostname: hostname.to_string(),
            phone: None,
            specs: BTreeMap::new(),
            location: None,
            created_at: now,
            online_since: None,
            dca: None,
            gateway: None,
            role: NodeRole::Plain,
            online: false,
            safemode: false,
            fs: Filesystem::with_skeleton(config.first_uid, config.first_gid),
            processes: HashMap::new(),
            queue: VecDeque::new(),
            running: None,
            closed: HashMap::new(),
            next_pid: 1,
            pid_ceiling: config.pid_ceiling.max(2),
            next_tty: config.tty_reserved,
            tty_reserved: config.tty_reserved,
            tty_ceiling: config.tty_ceiling.max(config.tty_reserved),
        })
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), ValueError> {
        validate_hostname(hostname)?;
        self.hostname = hostname.to_string();
        Ok(())
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn online_since(&self) -> Option<Instant> {
        self.online_since
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        match (self.online, self.online_since) {
            (true, Some(since)) => now.duration_since(since),
            _ => Duration::ZERO,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn in_safe_mode(&self) -> bool {
        self.safemode
    }

    pub fn dca(&self) -> Option<Dca> {
        self.dca
    }

    pub fn gateway(&self) -> Option<HostId> {
        self.gateway
    }

    pub fn role(&self) -> &NodeRole {
        &self.role
    }

    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut Filesystem {
        &mut self.fs
    }

    pub(crate) fn power_on(&mut self, safemode: bool, now: Instant) {
        self.online = true;
        self.safemode = safemode;
        self.online_since = Some(now);
    }

    pub(crate) fn power_off(&mut self) {
        self.online = false;
        self.safemode = false;
        self.online_since = None;
    }

    // Process table

    /// Scheduler-visible state of a process in the table
    ///
    /// The process whose step is executing is not in the table.
    pub fn process(&self, pid: Pid) -> Option<&ProcessCore> {
        self.processes.get(&pid).map(|p| &p.core)
    }

    pub fn process_wait(&self, pid: Pid) -> Option<Wait> {
        self.processes.get(&pid).map(Process::wait)
    }

    /// Live pids in ascending order
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.keys().copied().collect();
        if let Some(running) = &self.running {
            pids.push(running.pid);
        }
        pids.sort();
        pids
    }

    pub fn process_count(&self) -> usize {
        self.processes.len() + usize::from(self.running.is_some())
    }

    pub(crate) fn is_live(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid) || self.is_running(pid)
    }

    pub(crate) fn is_running(&self, pid: Pid) -> bool {
        self.running.as_ref().is_some_and(|r| r.pid == pid)
    }

    /// Owner of a live process
    pub(crate) fn owner_of(&self, pid: Pid) -> Option<&str> {
        match &self.running {
            Some(running) if running.pid == pid => Some(running.user.as_str()),
            _ => self.processes.get(&pid).map(|p| p.core.user.as_str()),
        }
    }

    /// Next free pid in `[1, ceiling)`, scanning forward with wraparound
    pub fn request_pid(&mut self) -> Option<Pid> {
        let span = self.pid_ceiling - 1;
        for _ in 0..span {
            let mut raw = self.next_pid;
            if raw == 0 || raw >= self.pid_ceiling {
                raw = 1;
            }
            self.next_pid = raw + 1;
            let pid = Pid::new(raw);
            if !self.is_live(pid) {
                return Some(pid);
            }
        }
        None
    }

    /// Next tty in `[reserved, ceiling)` that no live process holds
    pub fn request_tty(&mut self) -> Option<Tty> {
        let span = self.tty_ceiling - self.tty_reserved;
        for _ in 0..span {
            let mut raw = self.next_tty;
            if raw < self.tty_reserved || raw >= self.tty_ceiling {
                raw = self.tty_reserved;
            }
            self.next_tty = raw + 1;
            let tty = Tty::new(raw);
            if !self.tty_in_use(tty) {
                return Some(tty);
            }
        }
        None
    }

    pub fn tty_in_use(&self, tty: Tty) -> bool {
        self.running.as_ref().is_some_and(|r| r.tty == Some(tty))
            || self.processes.values().any(|p| p.core.tty == Some(tty))
    }

    /// Terminal-attached process holding `tty`, if any
    pub fn session_on(&self, tty: Tty) -> Option<Pid> {
        self.processes
            .values()
            .find(|p| p.core.tty == Some(tty) && p.core.origin == Origin::Terminal)
            .map(|p| p.core.pid)
    }

    // Accounts and programs

    pub fn get_home(&self, user: &str) -> Option<String> {
        self.fs.home_of(user)
    }

    pub fn get_shell(&self, user: &str) -> Option<String> {
        self.fs.shell_of(user)
    }

    /// Writes a program's catalog image to `/bin/<name>`
    pub fn install_program(&mut self, programs: &ProgramTable, name: &str) -> Result<(), OsError> {
        let image = programs.image(name).ok_or(OsError::NotFound)?;
        let path = PathResolver::join(BIN_DIR, name);
        self.fs
            .write_file(&path, SUPERUSER, image, WriteMode::Overwrite)?;
        self.fs.set_mode(&path, SUPERUSER, "rwxr-xr-x")
    }

    // Snapshots

    /// Encodes identity, address, routing tables and filesystem
    pub fn save(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a snapshot; the host comes back powered off with no processes
    pub fn load(bytes: &[u8]) -> Result<Host, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl NetworkNode for Host {
    fn dca(&self) -> Option<Dca> {
        self.dca
    }

    fn is_online(&self) -> bool {
        self.online
    }

    fn in_safe_mode(&self) -> bool {
        self.safemode
    }

    fn gateway(&self) -> Option<HostId> {
        self.gateway
    }

    fn role(&self) -> &NodeRole {
        &self.role
    }
}

/// First character alphanumeric, at most [`HOSTNAME_MAX`] characters
pub fn validate_hostname(hostname: &str) -> Result<(), ValueError> {
    let valid_start = hostname
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    if !valid_start || hostname.chars().count() > HOSTNAME_MAX {
        return Err(ValueError::Invalid(format!("hostname '{}'", hostname)));
    }
    Ok(())
}

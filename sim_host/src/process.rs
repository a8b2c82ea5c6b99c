//! Process records and the links between them

use crate::input::{LineEditor, Key, PacedQueue, Packet, PagerState, TerminalOutput};
use crate::program::{Runnable, Wait};
use core_types::{HostId, Pid, TermSize, Tty};
use host_api::Instant;

/// Stable key of a process anywhere in the simulation
///
/// Links are looked up on every use; a link to a reaped process simply
/// fails lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub host: HostId,
    pub pid: Pid,
}

impl Link {
    pub fn new(host: HostId, pid: Pid) -> Self {
        Self { host, pid }
    }
}

/// Who consumes a process's output and feeds its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Started by the system; output is discarded
    System,
    /// Attached to a terminal client; output queues on the process itself
    Terminal,
    /// Started by another process, which relays output upstream
    Process(Link),
}

/// Everything needed to start a process except its program
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub user: String,
    /// Defaults to the user's primary group on the target host
    pub group: Option<String>,
    pub cwd: String,
    pub tty: Option<Tty>,
    pub size: TermSize,
    pub params: Vec<String>,
    pub origin: Origin,
}

impl ProcessSpec {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: None,
            cwd: "/".to_string(),
            tty: None,
            size: TermSize::default(),
            params: Vec::new(),
            origin: Origin::System,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn tty(mut self, tty: Tty) -> Self {
        self.tty = Some(tty);
        self
    }

    pub fn size(mut self, size: TermSize) -> Self {
        self.size = size;
        self
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Scheduler-visible state of a process
#[derive(Debug)]
pub struct ProcessCore {
    pub pid: Pid,
    pub name: String,
    pub user: String,
    pub group: String,
    pub cwd: String,
    pub tty: Option<Tty>,
    pub size: TermSize,
    pub params: Vec<String>,
    pub origin: Origin,
    /// Child this process forwards its input to
    pub destin: Option<Link>,
    pub started_at: Instant,
    /// Wall-clock time spent inside steps
    pub cpu_time: std::time::Duration,
    /// Set when output could not be relayed upstream
    pub orphaned: bool,
    pub(crate) input: PacedQueue,
    pub(crate) editor: LineEditor,
    pub(crate) prompt: String,
    pub(crate) allowed: Vec<Key>,
    pub(crate) key: Option<Key>,
    pub(crate) pager: Option<PagerState>,
    pub(crate) terminal: TerminalOutput,
}

impl ProcessCore {
    pub(crate) fn new(pid: Pid, name: &str, spec: ProcessSpec, group: String, now: Instant) -> Self {
        Self {
            pid,
            name: name.to_string(),
            user: spec.user,
            group,
            cwd: spec.cwd,
            tty: spec.tty,
            size: spec.size,
            params: spec.params,
            origin: spec.origin,
            destin: None,
            started_at: now,
            cpu_time: std::time::Duration::ZERO,
            orphaned: false,
            input: PacedQueue::new(now),
            editor: LineEditor::default(),
            prompt: String::new(),
            allowed: Vec::new(),
            key: None,
            pager: None,
            terminal: TerminalOutput::new(now),
        }
    }

    /// Line most recently completed by the line editor
    pub fn line(&self) -> &str {
        self.editor.line()
    }

    /// Key most recently read by the single-key reader
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Keystrokes waiting to be read
    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    /// Recent terminal output, at most one screen
    pub fn scrollback(&self) -> &str {
        self.terminal.scrollback()
    }
}

/// A process in a host's table
pub(crate) struct Process {
    pub(crate) core: ProcessCore,
    pub(crate) program: Box<dyn Runnable>,
}

impl Process {
    pub(crate) fn wait(&self) -> Wait {
        self.program.waiting()
    }
}

/// Effects aimed at the process whose step is executing
///
/// While a process runs it is out of its host's table. Anything another
/// call does to it in the meantime lands here and is applied once the step
/// returns.
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) pid: Pid,
    pub(crate) tty: Option<Tty>,
    pub(crate) user: String,
    pub(crate) killed: bool,
    pub(crate) inbox: Vec<(Packet, bool)>,
    pub(crate) unlinked: Vec<Link>,
    pub(crate) resized: Option<TermSize>,
}

impl InFlight {
    pub(crate) fn new(core: &ProcessCore) -> Self {
        Self {
            pid: core.pid,
            tty: core.tty,
            user: core.user.clone(),
            killed: false,
            inbox: Vec::new(),
            unlinked: Vec::new(),
            resized: None,
        }
    }
}

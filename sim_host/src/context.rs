//! The interface a program step sees
//!
//! A [`ProcessContext`] borrows the whole simulation plus the core of the
//! process being stepped. Output helpers, the input editors and every
//! cross-host operation go through it.

use crate::config::SimulationConfig;
use crate::error::ProcessError;
use crate::host::Host;
use crate::input::{Edit, Key, Packet, PagerState};
use crate::process::{Link, Origin, ProcessCore, ProcessSpec};
use crate::program::{Continuation, Runnable};
use crate::programs::ProgramTable;
use crate::simulation::Simulation;
use core_types::{HostId, Pid, Tty};
use fs_guard::{Filesystem, PathResolver};
use host_api::{AccountDirectory, Duration, Instant, OsError};

pub(crate) enum LineEvent {
    Pending,
    Submitted,
    Interrupted,
}

pub(crate) enum PagerEvent {
    Open,
    Closed,
}

/// Options for [`ProcessContext::readline`]
#[derive(Debug, Clone)]
pub struct LineOptions<S> {
    prompt: String,
    on_interrupt: Option<S>,
    secure: bool,
    purge: bool,
    strip: bool,
}

impl<S> LineOptions<S> {
    /// Echoing, whitespace-stripping line read that discards stale input
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            on_interrupt: None,
            secure: false,
            purge: true,
            strip: true,
        }
    }

    /// State to run when ^C is pressed; without one ^C is ignored
    pub fn on_interrupt(mut self, state: S) -> Self {
        self.on_interrupt = Some(state);
        self
    }

    /// Echo `*` instead of the typed characters
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Keep keystrokes that arrived before the prompt
    pub fn keep_buffer(mut self) -> Self {
        self.purge = false;
        self
    }

    /// Keep leading and trailing whitespace
    pub fn raw(mut self) -> Self {
        self.strip = false;
        self
    }
}

const PAGER_KEYS: [Key; 4] = [Key::Up, Key::Down, Key::Char('q'), Key::Interrupt];

/// Step-time view of the simulation for one process
pub struct ProcessContext<'a> {
    pub(crate) sim: &'a mut Simulation,
    pub(crate) host: HostId,
    pub(crate) core: &'a mut ProcessCore,
}

impl<'a> ProcessContext<'a> {
    pub fn link(&self) -> Link {
        Link::new(self.host, self.core.pid)
    }

    pub fn host_id(&self) -> HostId {
        self.host
    }

    pub fn core(&self) -> &ProcessCore {
        self.core
    }

    pub fn core_mut(&mut self) -> &mut ProcessCore {
        self.core
    }

    pub fn now(&self) -> Instant {
        self.sim.now()
    }

    pub fn config(&self) -> &SimulationConfig {
        self.sim.config()
    }

    /// Last line completed by [`ProcessContext::readline`]
    pub fn line(&self) -> &str {
        self.core.line()
    }

    /// Last key read by [`ProcessContext::readchar`]
    pub fn key(&self) -> Option<&Key> {
        self.core.key()
    }

    /// Forgets the last completed line, e.g. after checking a password
    pub fn clear_line(&mut self) {
        self.core.editor.clear();
    }

    pub fn host(&self) -> Result<&Host, ProcessError> {
        self.sim
            .host(self.host)
            .ok_or_else(|| ProcessError::internal(format!("{} vanished mid-step", self.host)))
    }

    pub fn host_mut(&mut self) -> Result<&mut Host, ProcessError> {
        let id = self.host;
        self.sim
            .host_mut(id)
            .ok_or_else(|| ProcessError::internal(format!("{} vanished mid-step", id)))
    }

    pub fn fs(&self) -> Result<&Filesystem, ProcessError> {
        Ok(self.host()?.fs())
    }

    pub fn fs_mut(&mut self) -> Result<&mut Filesystem, ProcessError> {
        Ok(self.host_mut()?.fs_mut())
    }

    pub fn accounts(&self) -> &dyn AccountDirectory {
        self.sim.accounts()
    }

    pub fn programs(&self) -> &ProgramTable {
        self.sim.programs()
    }

    /// Resolves `path` against the working directory
    pub fn resolve_path(&self, path: &str) -> String {
        PathResolver::resolve(&self.core.cwd, path)
    }

    // Output

    pub fn send(&mut self, packet: Packet) {
        self.sim.emit_from(self.host, self.core, packet);
    }

    pub fn printl(&mut self, msg: impl Into<String>) {
        self.send(Packet::new(msg));
    }

    pub fn printl_after(&mut self, msg: impl Into<String>, delay: Duration) {
        self.send(Packet::new(msg).with_delay(delay));
    }

    /// Prints `msg` and a line break, unless `msg` exactly fills the width
    pub fn println(&mut self, msg: impl Into<String>) {
        self.println_after(msg, Duration::ZERO);
    }

    pub fn println_after(&mut self, msg: impl Into<String>, delay: Duration) {
        let mut msg = msg.into();
        if msg.chars().count() != self.core.size.width as usize {
            msg.push_str("\r\n");
        }
        self.printl_after(msg, delay);
    }

    pub fn error(&mut self, msg: impl AsRef<str>) {
        self.println(format!("%{}", msg.as_ref()));
    }

    pub fn beep(&mut self) {
        self.printl("\x07");
    }

    /// Prints one character at a time, `delay` apart
    ///
    /// Only the first character waits for network lag.
    pub fn sprintl(&mut self, msg: &str, delay: Duration) {
        let mut chars = msg.chars();
        let Some(first) = chars.next() else {
            return;
        };
        self.send(Packet::new(first.to_string()).with_delay(delay));
        for c in chars {
            self.send(Packet::new(c.to_string()).with_delay(delay).with_lag(None));
        }
    }

    pub fn sprintln(&mut self, msg: &str, delay: Duration) {
        self.sprintl(&format!("{}\r\n", msg), delay);
    }

    // Input

    /// Prints the prompt and arms the line editor
    pub fn readline<S>(&mut self, next: S, options: LineOptions<S>) -> Continuation<S> {
        let cap = self.sim.config().line_cap;
        let now = self.now();
        self.core.editor.begin(options.secure, options.strip, cap);
        if options.purge {
            self.core.input.purge();
        }
        self.core.input.reset_timer(now);
        self.core.prompt = options.prompt.clone();
        self.printl(options.prompt);
        Continuation::ReadLine {
            next,
            on_interrupt: options.on_interrupt,
        }
    }

    /// Prints the prompt and arms the single-key reader
    ///
    /// Keys outside a non-empty `allowed` set are discarded.
    pub fn readchar<S>(
        &mut self,
        next: S,
        prompt: impl Into<String>,
        allowed: &[Key],
        purge: bool,
    ) -> Continuation<S> {
        let now = self.now();
        self.core.key = None;
        self.core.allowed = allowed.to_vec();
        if purge {
            self.core.input.purge();
        }
        self.core.input.reset_timer(now);
        let prompt = prompt.into();
        self.core.prompt = prompt.clone();
        self.printl(prompt);
        Continuation::ReadChar { next }
    }

    /// Shows `lines`, scrolling when they do not fit one screen
    pub fn pager<S>(&mut self, lines: Vec<String>, next: S, force_dump: bool) -> Continuation<S> {
        let height = self.core.size.height as usize;
        if lines.len() <= height || force_dump {
            for line in lines {
                self.println(line);
            }
            return Continuation::Step(next);
        }
        self.core.pager = Some(PagerState::new(lines, height.saturating_sub(1)));
        self.core.key = None;
        self.core.allowed = PAGER_KEYS.to_vec();
        self.core.input.purge();
        let now = self.now();
        self.core.input.reset_timer(now);
        self.render_page();
        Continuation::Pager { next }
    }

    fn render_page(&mut self) {
        let Some(pager) = self.core.pager.as_ref() else {
            return;
        };
        let page: Vec<String> = pager.page().to_vec();
        let prompt = format!("--More--({}%)", pager.percent());
        for line in page {
            self.println(line);
        }
        self.printl(prompt);
    }

    /// Takes the next ready key that passes the filter
    fn take_key(&mut self) -> Option<Key> {
        let now = self.now();
        let packet = self.core.input.take_ready(now)?;
        let key = Key::parse(&packet.payload);
        if !self.core.allowed.is_empty() && !self.core.allowed.contains(&key) {
            return None;
        }
        Some(key)
    }

    pub(crate) fn poll_line(&mut self, interruptible: bool) -> LineEvent {
        let now = self.now();
        while let Some(packet) = self.core.input.take_ready(now) {
            let key = Key::parse(&packet.payload);
            match self.core.editor.apply(&key, interruptible) {
                Edit::Submit => {
                    self.println("");
                    return LineEvent::Submitted;
                }
                Edit::Interrupt => {
                    self.println("^C");
                    return LineEvent::Interrupted;
                }
                Edit::Echo(text) => self.printl(text),
                Edit::Ignore => {}
            }
        }
        LineEvent::Pending
    }

    /// True once a key has been stored for the program
    pub(crate) fn poll_char(&mut self) -> bool {
        match self.take_key() {
            Some(key) => {
                self.println(key.to_string());
                self.core.key = Some(key);
                true
            }
            None => false,
        }
    }

    pub(crate) fn poll_pager(&mut self) -> PagerEvent {
        let Some(key) = self.take_key() else {
            return PagerEvent::Open;
        };
        let Some(pager) = self.core.pager.as_mut() else {
            return PagerEvent::Closed;
        };
        match key {
            Key::Up => pager.scroll_up(),
            Key::Down => pager.scroll_down(),
            _ => {
                self.core.pager = None;
                self.core.key = Some(key);
                self.println("");
                return PagerEvent::Closed;
            }
        }
        self.printl("\r\n");
        self.render_page();
        PagerEvent::Open
    }

    // Processes and network

    /// Resolves a host address from this process's host
    pub fn resolve(&self, address: &str) -> Option<HostId> {
        self.sim.resolve(self.host, address)
    }

    pub fn request_tty(&mut self, host: HostId) -> Option<Tty> {
        self.sim.request_tty(host)
    }

    pub fn check_pass(&self, host: HostId, user: &str, candidate: &str) -> bool {
        self.sim.check_pass(host, user, candidate)
    }

    /// Validates an executable on `host` and instantiates its program
    pub fn exec(&self, host: HostId, path: &str) -> Result<Box<dyn Runnable>, ProcessError> {
        let path = if host == self.host {
            self.resolve_path(path)
        } else {
            PathResolver::resolve(PathResolver::ROOT, path)
        };
        let target = self
            .sim
            .host(host)
            .ok_or(ProcessError::Os(OsError::NotFound))?;
        let descriptor = target
            .fs()
            .exec_file(&path, &self.core.user, self.sim.programs())?;
        self.sim
            .programs()
            .instantiate(&descriptor.name)
            .ok_or(ProcessError::Os(OsError::ExecFormat))
    }

    /// Starts a child on `host` and forwards this process's input to it
    ///
    /// The child's origin is this process. Returns `None` when the host is
    /// offline or out of PIDs.
    pub fn start_child(
        &mut self,
        host: HostId,
        spec: ProcessSpec,
        program: Box<dyn Runnable>,
    ) -> Option<Link> {
        let spec = spec.origin(Origin::Process(self.link()));
        let pid = self.sim.start(host, spec, program)?;
        let child = Link::new(host, pid);
        self.core.destin = Some(child);
        Some(child)
    }

    /// Starts a detached process with no upstream
    pub fn start(&mut self, host: HostId, spec: ProcessSpec, program: Box<dyn Runnable>) -> Option<Pid> {
        self.sim.start(host, spec.origin(Origin::System), program)
    }

    pub fn kill(&mut self, target: Link) -> bool {
        if target == self.link() {
            return self.sim.kill(target);
        }
        let killed = self.sim.kill(target);
        if killed && self.core.destin == Some(target) {
            self.core.destin = None;
        }
        killed
    }

    pub fn stdin(&mut self, target: Link, packet: Packet, forward: bool) -> bool {
        self.sim.stdin(target, packet, forward)
    }
}

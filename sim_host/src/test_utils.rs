//! Test utilities
//!
//! Small programs that exercise one engine feature each, a stock account
//! directory, and builders for hosts and networks.

use crate::context::{LineOptions, ProcessContext};
use crate::error::ProcessError;
use crate::input::Key;
use crate::process::ProcessSpec;
use crate::program::{Continuation, Driver, Program, Runnable};
use crate::programs::ProgramTable;
use crate::{Simulation, SimulationConfig};
use core_types::HostId;
use host_api::{
    IncidentReport, IncidentSink, InMemoryAccounts, MemoryIncidentSink, OsError, StoredAccount,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Prints one line and exits
pub struct EchoOnce {
    text: String,
}

impl EchoOnce {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Program for EchoOnce {
    type State = ();

    fn name(&self) -> &str {
        "echo"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), cx: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        cx.println(self.text.clone());
        Ok(Continuation::Exit)
    }
}

/// Steps forever without output
pub struct Idle;

impl Program for Idle {
    type State = ();

    fn name(&self) -> &str {
        "idle"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), _: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        Ok(Continuation::Step(()))
    }
}

/// Shared step counter
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// A program that bumps this counter on every step
    pub fn program(&self) -> Counting {
        Counting(self.0.clone())
    }
}

pub struct Counting(Arc<AtomicUsize>);

impl Program for Counting {
    type State = ();

    fn name(&self) -> &str {
        "counter"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), _: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Continuation::Step(()))
    }
}

/// Records every line submitted to a looping prompt
#[derive(Debug, Clone, Default)]
pub struct LineReader {
    lines: Arc<Mutex<Vec<String>>>,
    interrupts: Arc<AtomicUsize>,
}

impl LineReader {
    pub fn program(&self) -> ReadLines {
        ReadLines {
            shared: self.clone(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum ReadState {
    Prompt,
    Got,
    Interrupted,
}

pub struct ReadLines {
    shared: LineReader,
}

impl ReadLines {
    fn prompt(cx: &mut ProcessContext<'_>) -> Continuation<ReadState> {
        cx.readline(
            ReadState::Got,
            LineOptions::new("> ").on_interrupt(ReadState::Interrupted),
        )
    }
}

impl Program for ReadLines {
    type State = ReadState;

    fn name(&self) -> &str {
        "reader"
    }

    fn entry(&self) -> ReadState {
        ReadState::Prompt
    }

    fn step(
        &mut self,
        state: ReadState,
        cx: &mut ProcessContext<'_>,
    ) -> Result<Continuation<ReadState>, ProcessError> {
        match state {
            ReadState::Prompt => Ok(Self::prompt(cx)),
            ReadState::Got => {
                let line = cx.line().to_string();
                if line == "exit" {
                    return Ok(Continuation::Exit);
                }
                if let Ok(mut lines) = self.shared.lines.lock() {
                    lines.push(line);
                }
                Ok(Self::prompt(cx))
            }
            ReadState::Interrupted => {
                self.shared.interrupts.fetch_add(1, Ordering::SeqCst);
                Ok(Self::prompt(cx))
            }
        }
    }
}

/// Runs `params[1]` on the host at address `params[0]` and relays to it
///
/// The remote binary must be installed under `/bin` there.
pub struct RelayShell;

#[derive(Debug)]
pub enum RelayState {
    Connect,
    Attached,
}

impl Program for RelayShell {
    type State = RelayState;

    fn name(&self) -> &str {
        "relay"
    }

    fn entry(&self) -> RelayState {
        RelayState::Connect
    }

    fn step(
        &mut self,
        state: RelayState,
        cx: &mut ProcessContext<'_>,
    ) -> Result<Continuation<RelayState>, ProcessError> {
        match state {
            RelayState::Connect => {
                let params = cx.core().params.clone();
                let (Some(address), Some(command)) = (params.first(), params.get(1)) else {
                    cx.error("usage: relay <address> <program>");
                    return Ok(Continuation::Exit);
                };
                let Some(target) = cx.resolve(address) else {
                    cx.error(format!("{}: host unreachable", address));
                    return Ok(Continuation::Exit);
                };
                let program = cx.exec(target, &format!("/bin/{}", command))?;
                let spec = ProcessSpec::new(cx.core().user.clone()).size(cx.core().size);
                if cx.start_child(target, spec, program).is_none() {
                    cx.error("unable to start remote process");
                    return Ok(Continuation::Exit);
                }
                Ok(Continuation::Step(RelayState::Attached))
            }
            RelayState::Attached => {
                cx.println("Connection closed.");
                Ok(Continuation::Exit)
            }
        }
    }
}

/// Reads one y/n key and prints it
#[derive(Debug, Clone, Default)]
pub struct KeyReader {
    seen: Arc<Mutex<Option<Key>>>,
}

impl KeyReader {
    pub fn seen(&self) -> Option<Key> {
        self.seen.lock().ok().and_then(|k| k.clone())
    }

    pub fn program(&self) -> ReadKey {
        ReadKey {
            shared: self.clone(),
        }
    }
}

#[derive(Debug)]
pub enum KeyState {
    Ask,
    Got,
}

pub struct ReadKey {
    shared: KeyReader,
}

impl Program for ReadKey {
    type State = KeyState;

    fn name(&self) -> &str {
        "keys"
    }

    fn entry(&self) -> KeyState {
        KeyState::Ask
    }

    fn step(
        &mut self,
        state: KeyState,
        cx: &mut ProcessContext<'_>,
    ) -> Result<Continuation<KeyState>, ProcessError> {
        match state {
            KeyState::Ask => Ok(cx.readchar(
                KeyState::Got,
                "Continue? [y/n] ",
                &[Key::Char('y'), Key::Char('n')],
                true,
            )),
            KeyState::Got => {
                let key = cx.key().cloned();
                if let Ok(mut seen) = self.shared.seen.lock() {
                    *seen = key;
                }
                Ok(Continuation::Exit)
            }
        }
    }
}

/// Pages through numbered lines, then prints `done`
pub struct PagerDemo {
    lines: usize,
    force_dump: bool,
}

impl PagerDemo {
    pub fn new(lines: usize) -> Self {
        Self {
            lines,
            force_dump: false,
        }
    }

    pub fn dumped(lines: usize) -> Self {
        Self {
            lines,
            force_dump: true,
        }
    }
}

#[derive(Debug)]
pub enum PageState {
    Show,
    Done,
}

impl Program for PagerDemo {
    type State = PageState;

    fn name(&self) -> &str {
        "pager"
    }

    fn entry(&self) -> PageState {
        PageState::Show
    }

    fn step(
        &mut self,
        state: PageState,
        cx: &mut ProcessContext<'_>,
    ) -> Result<Continuation<PageState>, ProcessError> {
        match state {
            PageState::Show => {
                let lines = (1..=self.lines).map(|n| format!("line {}", n)).collect();
                Ok(cx.pager(lines, PageState::Done, self.force_dump))
            }
            PageState::Done => {
                cx.println("done");
                Ok(Continuation::Exit)
            }
        }
    }
}

/// Panics on its first step
pub struct Panicker;

impl Program for Panicker {
    type State = ();

    fn name(&self) -> &str {
        "panic"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), _: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        panic!("boom");
    }
}

/// Fails its first step with a domain error
pub struct Failing;

impl Program for Failing {
    type State = ();

    fn name(&self) -> &str {
        "fail"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), _: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        Err(OsError::PermissionDenied.into())
    }
}

/// Fails its first step with an internal error
pub struct Faulting;

impl Program for Faulting {
    type State = ();

    fn name(&self) -> &str {
        "fault"
    }

    fn entry(&self) {}

    fn step(&mut self, _: (), _: &mut ProcessContext<'_>) -> Result<Continuation<()>, ProcessError> {
        Err(ProcessError::internal("index out of bounds"))
    }
}

/// Incident sink whose reports stay readable after the simulation owns it
#[derive(Debug, Clone, Default)]
pub struct SharedIncidents(Arc<Mutex<MemoryIncidentSink>>);

impl SharedIncidents {
    pub fn reports(&self) -> Vec<IncidentReport> {
        self.0
            .lock()
            .map(|sink| sink.reports().to_vec())
            .unwrap_or_default()
    }
}

impl IncidentSink for SharedIncidents {
    fn record(&mut self, report: IncidentReport) {
        if let Ok(mut sink) = self.0.lock() {
            sink.record(report);
        }
    }
}

/// Cheap key stretching for fixture accounts
const FIXTURE_ROUNDS: u32 = 16;

/// `alice`, `bob`, `root` and the superuser `admin`; passwords are `<name>pw`
pub fn test_accounts() -> InMemoryAccounts {
    InMemoryAccounts::new()
        .with(StoredAccount::with_rounds("alice", "alicepw", FIXTURE_ROUNDS))
        .with(StoredAccount::with_rounds("bob", "bobpw", FIXTURE_ROUNDS))
        .with(StoredAccount::with_rounds("root", "rootpw", FIXTURE_ROUNDS))
        .with(StoredAccount::with_rounds("admin", "adminpw", FIXTURE_ROUNDS).superuser())
}

pub fn test_programs() -> ProgramTable {
    fn echo() -> Box<dyn Runnable> {
        Driver::boxed(EchoOnce::new("hello"))
    }
    fn idle() -> Box<dyn Runnable> {
        Driver::boxed(Idle)
    }
    fn reader() -> Box<dyn Runnable> {
        Driver::boxed(LineReader::default().program())
    }
    fn relay() -> Box<dyn Runnable> {
        Driver::boxed(RelayShell)
    }
    fn keys() -> Box<dyn Runnable> {
        Driver::boxed(KeyReader::default().program())
    }
    fn pager() -> Box<dyn Runnable> {
        Driver::boxed(PagerDemo::new(40))
    }
    fn panicker() -> Box<dyn Runnable> {
        Driver::boxed(Panicker)
    }
    fn failing() -> Box<dyn Runnable> {
        Driver::boxed(Failing)
    }
    fn faulting() -> Box<dyn Runnable> {
        Driver::boxed(Faulting)
    }

    ProgramTable::new()
        .with("echo", "#!echo 1.0", echo)
        .with("idle", "#!idle 1.0", idle)
        .with("reader", "#!reader 1.0", reader)
        .with("relay", "#!relay 1.0", relay)
        .with("keys", "#!keys 1.0", keys)
        .with("pager", "#!pager 1.0", pager)
        .with("panic", "#!panic 1.0", panicker)
        .with("fail", "#!fail 1.0", failing)
        .with("fault", "#!fault 1.0", faulting)
}

pub fn test_simulation() -> Simulation {
    test_simulation_with(SimulationConfig::default())
}

pub fn test_simulation_with(config: SimulationConfig) -> Simulation {
    Simulation::new(config, test_accounts()).with_programs(test_programs())
}

/// Creates a powered-on host with every test program installed
pub fn online_host(sim: &mut Simulation, hostname: &str) -> HostId {
    let id = match sim.create_host(hostname) {
        Ok(id) => id,
        Err(err) => panic!("test host {}: {}", hostname, err),
    };
    sim.startup(id, false);
    let names: Vec<String> = sim.programs().names().map(str::to_string).collect();
    for name in names {
        if let Err(err) = sim.install_program(id, &name) {
            panic!("installing {} on {}: {}", name, hostname, err);
        }
    }
    id
}

/// ISP `1.0.0` ← router `1.1.0` ← host `1.1.1`, all online
pub fn three_level_network(sim: &mut Simulation) -> (HostId, HostId, HostId) {
    let isp = online_host(sim, "isp");
    let router = online_host(sim, "router");
    let host = online_host(sim, "host");
    if sim.assign_isp(isp).is_none()
        || sim.assign_router(isp, router).is_none()
        || sim.assign_host(router, host).is_none()
    {
        panic!("three-level address assignment failed");
    }
    (isp, router, host)
}

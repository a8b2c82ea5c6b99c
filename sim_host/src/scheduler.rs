//! Round-robin scheduling
//!
//! Each tick every online host hands out at most `min(quota, queue length)`
//! slots. A slot pops the front pid and either:
//!
//! - reaps it, if its upstream is gone (lazy cascade)
//! - rotates it to the tail untouched, if it is piped to a live child
//! - runs one step, then requeues or reaps it
//!
//! During a step the process is out of its host's table; effects other calls
//! aim at it are parked in [`InFlight`] and applied afterwards.

use crate::context::ProcessContext;
use crate::error::ProcessError;
use crate::input::Packet;
use crate::process::{InFlight, Link, Origin, Process};
use crate::program::Flow;
use crate::simulation::Simulation;
use core_types::{HostId, IncidentId};
use host_api::{Duration, IncidentReport};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

enum Outcome {
    Continue,
    Exit,
    Failed(ProcessError),
    Panicked(String),
}

impl Simulation {
    /// Updates every host once, in registry order
    pub fn tick(&mut self) {
        let order = self.order.clone();
        for id in order {
            self.update_host(id);
        }
    }

    /// Advances the clock, then ticks
    pub fn tick_after(&mut self, by: Duration) {
        self.advance_time(by);
        self.tick();
    }

    pub fn update_host(&mut self, id: HostId) {
        let now = self.now();
        let quota = self.config().process_quota;
        let slots = match self.hosts.get_mut(&id) {
            Some(host) if host.is_online() => {
                host.fs_mut().set_clock(now);
                quota.min(host.queue.len())
            }
            _ => return,
        };
        for _ in 0..slots {
            if !self.run_slot(id) {
                break;
            }
        }
    }

    /// Returns false once the host can no longer be scheduled
    fn run_slot(&mut self, id: HostId) -> bool {
        let Some(host) = self.hosts.get_mut(&id) else {
            return false;
        };
        if !host.is_online() {
            return false;
        }
        let Some(pid) = host.queue.pop_front() else {
            return false;
        };
        let Some(process) = host.processes.get(&pid) else {
            return true;
        };
        let link = Link::new(id, pid);
        let (orphaned, origin, destin) = (
            process.core.orphaned,
            process.core.origin,
            process.core.destin,
        );

        if orphaned || !self.origin_alive(origin) {
            if let Some(process) = self.take_process(link) {
                self.reap(link, process, "orphaned");
            }
            return true;
        }

        if let Some(child) = destin {
            if self.is_live(child) {
                self.requeue(link);
                return true;
            }
            warn!(host = %id, pid = %pid, child = ?child, "pruned stale forward link");
            if let Some(process) = self.process_mut(link) {
                process.core.destin = None;
            }
        }

        self.step(link);
        true
    }

    fn origin_alive(&self, origin: Origin) -> bool {
        match origin {
            Origin::System | Origin::Terminal => true,
            Origin::Process(parent) => self
                .hosts
                .get(&parent.host)
                .is_some_and(|h| h.is_online() && h.is_live(parent.pid)),
        }
    }

    fn requeue(&mut self, link: Link) {
        if let Some(host) = self.hosts.get_mut(&link.host) {
            host.queue.push_back(link.pid);
        }
    }

    pub(crate) fn take_process(&mut self, link: Link) -> Option<Process> {
        let host = self.hosts.get_mut(&link.host)?;
        let process = host.processes.remove(&link.pid)?;
        host.queue.retain(|pid| *pid != link.pid);
        Some(process)
    }

    fn step(&mut self, link: Link) {
        let Some(host) = self.hosts.get_mut(&link.host) else {
            return;
        };
        let Some(mut process) = host.processes.remove(&link.pid) else {
            return;
        };
        host.running = Some(InFlight::new(&process.core));

        let started = std::time::Instant::now();
        let outcome = {
            let Process { core, program } = &mut process;
            let mut cx = ProcessContext {
                sim: &mut *self,
                host: link.host,
                core,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| program.run_slice(&mut cx))) {
                Ok(Ok(Flow::Continue)) => Outcome::Continue,
                Ok(Ok(Flow::Exit)) => Outcome::Exit,
                Ok(Err(err)) => Outcome::Failed(err),
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            }
        };
        process.core.cpu_time += started.elapsed();

        let inflight = self
            .hosts
            .get_mut(&link.host)
            .and_then(|host| host.running.take());
        let Some(inflight) = inflight else {
            // The host was removed mid-step
            process.program.on_kill();
            return;
        };

        match outcome {
            Outcome::Continue if !inflight.killed => self.resume(link, process, inflight),
            Outcome::Continue => self.reap(link, process, "killed"),
            Outcome::Exit => self.reap(link, process, "exited"),
            Outcome::Failed(err) if err.is_domain() => {
                debug!(host = %link.host, pid = %link.pid, error = %err, "domain error ended process");
                self.emit_from(link.host, &mut process.core, Packet::new(format!("%{}\r\n", err)));
                self.reap(link, process, "error");
            }
            Outcome::Failed(err) => {
                self.report_incident(link, &mut process, err.to_string());
                self.reap(link, process, "fault");
            }
            Outcome::Panicked(message) => {
                self.report_incident(link, &mut process, message);
                self.reap(link, process, "fault");
            }
        }
    }

    /// Puts a process back after its step and replays what was parked
    fn resume(&mut self, link: Link, mut process: Process, inflight: InFlight) {
        for gone in &inflight.unlinked {
            if process.core.destin == Some(*gone) {
                process.core.destin = None;
            }
        }
        let Some(host) = self.hosts.get_mut(&link.host) else {
            return;
        };
        host.processes.insert(link.pid, process);
        host.queue.push_back(link.pid);

        if let Some(size) = inflight.resized {
            self.resize(link, size);
        }
        for (packet, forward) in inflight.inbox {
            self.relay(link, packet, forward, 0);
        }
    }

    /// Runs cleanup and detaches the process from its parent
    pub(crate) fn reap(&mut self, link: Link, mut process: Process, reason: &str) {
        info!(
            host = %link.host,
            pid = %link.pid,
            program = %process.core.name,
            reason,
            "process reaped"
        );
        if panic::catch_unwind(AssertUnwindSafe(|| process.program.on_kill())).is_err() {
            warn!(host = %link.host, pid = %link.pid, "kill hook panicked");
        }
        self.unlink_origin(link, process.core.origin);
        if process.core.origin == Origin::Terminal && process.core.terminal.pending() > 0 {
            if let Some(host) = self.hosts.get_mut(&link.host) {
                let height = process.core.size.height;
                host.closed.insert(link.pid, (process.core.terminal, height));
            }
        }
    }

    fn unlink_origin(&mut self, link: Link, origin: Origin) {
        let Origin::Process(parent) = origin else {
            return;
        };
        let Some(host) = self.hosts.get_mut(&parent.host) else {
            return;
        };
        match host.running.as_mut() {
            Some(running) if running.pid == parent.pid => running.unlinked.push(link),
            _ => {
                if let Some(p) = host.processes.get_mut(&parent.pid) {
                    if p.core.destin == Some(link) {
                        p.core.destin = None;
                    }
                }
            }
        }
    }

    fn report_incident(&mut self, link: Link, process: &mut Process, message: String) {
        let id = IncidentId::new();
        error!(
            incident = %id,
            host = %link.host,
            pid = %link.pid,
            program = %process.core.name,
            %message,
            "internal fault in process step"
        );
        let report = IncidentReport {
            id,
            host: link.host,
            pid: link.pid,
            program: process.core.name.clone(),
            user: process.core.user.clone(),
            message,
            at: self.now(),
        };
        self.incidents.record(report);
        let notice = Packet::new(format!("%internal error: incident {}\r\n", id));
        self.emit_from(link.host, &mut process.core, notice);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessSpec;
    use crate::program::{Driver, Wait};
    use crate::test_utils::{
        online_host, test_simulation, test_simulation_with, Counter, EchoOnce, Failing, Faulting,
        Idle, Panicker, SharedIncidents,
    };
    use crate::SimulationConfig;

    fn terminal_spec() -> ProcessSpec {
        ProcessSpec::new("root").origin(Origin::Terminal)
    }

    #[test]
    fn test_exit_reaps() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let pid = sim
            .start(id, terminal_spec(), Driver::boxed(EchoOnce::new("hi")))
            .unwrap();
        sim.tick();
        assert!(!sim.is_live(Link::new(id, pid)));
    }

    #[test]
    fn test_quota_bounds_slots() {
        let mut sim = test_simulation_with(SimulationConfig {
            process_quota: 2,
            ..SimulationConfig::default()
        });
        let id = online_host(&mut sim, "box");
        let counter = Counter::default();
        for _ in 0..5 {
            sim.start(id, ProcessSpec::new("root"), Driver::boxed(counter.program()));
        }
        sim.tick();
        assert_eq!(counter.get(), 2);
        sim.tick();
        sim.tick();
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_piped_process_is_rotated_not_run() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let counter = Counter::default();
        let parent = sim
            .start(id, ProcessSpec::new("root"), Driver::boxed(counter.program()))
            .unwrap();
        let child = sim
            .start(
                id,
                ProcessSpec::new("root").origin(Origin::Process(Link::new(id, parent))),
                Driver::boxed(Idle),
            )
            .unwrap();
        sim.process_mut(Link::new(id, parent)).unwrap().core.destin = Some(Link::new(id, child));

        sim.tick();
        sim.tick();
        assert_eq!(counter.get(), 0);

        sim.kill(Link::new(id, child));
        sim.tick();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_domain_error_prints_and_reaps() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let pid = sim
            .start(id, terminal_spec(), Driver::boxed(Failing))
            .unwrap();
        let link = Link::new(id, pid);
        sim.tick();
        assert!(!sim.is_live(link));
    }

    #[test]
    fn test_panic_becomes_incident() {
        let incidents = SharedIncidents::default();
        let mut sim = test_simulation().with_incident_sink(incidents.clone());
        let id = online_host(&mut sim, "box");
        let pid = sim
            .start(id, ProcessSpec::new("alice"), Driver::boxed(Panicker))
            .unwrap();
        sim.tick();

        assert!(!sim.is_live(Link::new(id, pid)));
        let reports = incidents.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].pid, pid);
        assert_eq!(reports[0].user, "alice");
        assert!(reports[0].message.contains("boom"));
    }

    #[test]
    fn test_internal_error_becomes_incident() {
        let incidents = SharedIncidents::default();
        let mut sim = test_simulation().with_incident_sink(incidents.clone());
        let id = online_host(&mut sim, "box");
        sim.start(id, ProcessSpec::new("root"), Driver::boxed(Faulting));
        sim.tick();
        let reports = incidents.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].program, "fault");
    }

    #[test]
    fn test_dead_origin_cascades_lazily() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let parent = sim
            .start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
            .unwrap();
        let child = sim
            .start(
                id,
                ProcessSpec::new("root").origin(Origin::Process(Link::new(id, parent))),
                Driver::boxed(Idle),
            )
            .unwrap();

        assert!(sim.kill(Link::new(id, parent)));
        assert!(sim.is_live(Link::new(id, child)));
        sim.tick();
        assert!(!sim.is_live(Link::new(id, child)));
    }

    #[test]
    fn test_idle_stays_running() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let pid = sim
            .start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
            .unwrap();
        for _ in 0..10 {
            sim.tick();
        }
        assert_eq!(sim.process_wait(Link::new(id, pid)), Some(Wait::Running));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(panic_message(payload.as_ref()), "plain");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert!(panic_message(payload.as_ref()).contains("non-string"));
    }
}

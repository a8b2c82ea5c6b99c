//! I/O relay and terminal sessions
//!
//! Output always travels up `origin` links until it reaches a terminal or
//! the system sink. Input delivered with `forward` travels down `destin`
//! links to the innermost attached child and is buffered there.

use crate::input::Packet;
use crate::process::{Link, Origin, ProcessCore, ProcessSpec};
use crate::simulation::Simulation;
use core_types::{HostId, Pid, TermSize, Tty};
use tracing::{debug, info, warn};

/// Result of polling a session for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Ready(String),
    Pending,
    /// The session's process is gone and its output drained
    Closed,
}

/// How far a relayed packet got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayOutcome {
    Delivered,
    /// The target is not a live process on an online host
    Gone,
    /// The chain exceeded `max_relay_depth`; the packet was dropped
    TooDeep,
}

impl Simulation {
    /// Emits output produced by `core`, which may be out of any table
    pub(crate) fn emit_from(&mut self, host: HostId, core: &mut ProcessCore, packet: Packet) {
        match core.origin {
            Origin::System => {}
            Origin::Terminal => core.terminal.push(packet),
            Origin::Process(parent) => {
                let outcome = self.relay(parent, packet, false, 0);
                if outcome == RelayOutcome::Gone && !core.orphaned {
                    warn!(host = %host, pid = %core.pid, "upstream gone; process orphaned");
                    core.orphaned = true;
                }
            }
        }
    }

    /// Delivers a packet to a process
    ///
    /// Without `forward` the packet is output of `target` and goes upstream.
    /// With it the packet is input: it follows `destin` to the attached
    /// child, falling back to the local buffer when that link is stale.
    /// Returns false if `target` is not a live process on an online host,
    /// or if the chain behind it is too deep and the packet was dropped.
    pub fn stdin(&mut self, target: Link, packet: Packet, forward: bool) -> bool {
        match self.relay(target, packet, forward, 0) {
            RelayOutcome::Delivered => true,
            RelayOutcome::Gone => {
                debug!(host = %target.host, pid = %target.pid, "stdin target not found");
                false
            }
            RelayOutcome::TooDeep => false,
        }
    }

    pub(crate) fn relay(
        &mut self,
        target: Link,
        packet: Packet,
        forward: bool,
        depth: usize,
    ) -> RelayOutcome {
        if depth > self.config().max_relay_depth {
            warn!(host = %target.host, pid = %target.pid, depth, "relay chain too deep; packet dropped");
            return RelayOutcome::TooDeep;
        }
        let Some(host) = self.hosts.get_mut(&target.host) else {
            return RelayOutcome::Gone;
        };
        if !host.is_online() {
            return RelayOutcome::Gone;
        }
        if let Some(running) = host.running.as_mut() {
            if running.pid == target.pid {
                running.inbox.push((packet, forward));
                return RelayOutcome::Delivered;
            }
        }
        let Some(process) = host.processes.get_mut(&target.pid) else {
            return RelayOutcome::Gone;
        };

        if !forward {
            let origin = process.core.origin;
            return match origin {
                Origin::System => RelayOutcome::Delivered,
                Origin::Terminal => {
                    process.core.terminal.push(packet);
                    RelayOutcome::Delivered
                }
                Origin::Process(parent) => match self.relay(parent, packet, false, depth + 1) {
                    RelayOutcome::Gone => {
                        self.mark_orphaned(target);
                        RelayOutcome::Delivered
                    }
                    outcome => outcome,
                },
            };
        }

        let Some(child) = process.core.destin else {
            process.core.input.push(packet);
            return RelayOutcome::Delivered;
        };
        match self.relay(child, packet.clone(), true, depth + 1) {
            RelayOutcome::Gone => {}
            outcome => return outcome,
        }
        warn!(host = %target.host, pid = %target.pid, child = ?child, "pruned stale forward link");
        if let Some(process) = self.process_mut(target) {
            process.core.destin = None;
            process.core.input.push(packet);
        }
        RelayOutcome::Delivered
    }

    fn mark_orphaned(&mut self, link: Link) {
        if let Some(process) = self.process_mut(link) {
            if !process.core.orphaned {
                warn!(host = %link.host, pid = %link.pid, "upstream gone; process orphaned");
                process.core.orphaned = true;
            }
        }
    }

    /// Kills a process; a process mid-step is reaped when its step returns
    ///
    /// Children are not killed. They are reaped once they notice their
    /// origin is gone.
    pub fn kill(&mut self, link: Link) -> bool {
        let Some(host) = self.hosts.get_mut(&link.host) else {
            return false;
        };
        if let Some(running) = host.running.as_mut() {
            if running.pid == link.pid {
                running.killed = true;
                return true;
            }
        }
        match self.take_process(link) {
            Some(process) => {
                self.reap(link, process, "killed");
                true
            }
            None => false,
        }
    }

    /// Applies a terminal size to a process and everything it forwards to
    ///
    /// A stale link met on the way down is cleared where it was found.
    pub fn resize(&mut self, link: Link, size: TermSize) -> bool {
        let size = TermSize::clamped(size.width, size.height);
        let mut target = link;
        let mut parent: Option<Link> = None;
        for _ in 0..=self.config().max_relay_depth {
            let next = match self.hosts.get_mut(&target.host) {
                Some(host) => match host.running.as_mut() {
                    Some(running) if running.pid == target.pid => {
                        running.resized = Some(size);
                        return true;
                    }
                    _ => host.processes.get_mut(&target.pid).map(|p| {
                        p.core.size = size;
                        p.core.destin
                    }),
                },
                None => None,
            };
            match next {
                Some(Some(child)) => {
                    parent = Some(target);
                    target = child;
                }
                Some(None) => return true,
                None => {
                    let Some(parent) = parent else {
                        return false;
                    };
                    warn!(host = %parent.host, pid = %parent.pid, "pruned stale forward link");
                    if let Some(process) = self.process_mut(parent) {
                        process.core.destin = None;
                    }
                    return true;
                }
            }
        }
        true
    }

    // Sessions

    /// Attaches a terminal client to `tty` on `host`
    ///
    /// If a terminal-attached process already holds the tty it is recovered
    /// and its output pacing restarts. Otherwise `program` starts as `user`
    /// in their home directory.
    pub fn open_session(
        &mut self,
        host_id: HostId,
        user: &str,
        tty: Tty,
        size: TermSize,
        program: &str,
    ) -> Option<Pid> {
        let now = self.now();
        let host = self.hosts.get_mut(&host_id)?;
        if !host.is_online() {
            return None;
        }
        if let Some(pid) = host.session_on(tty) {
            if let Some(process) = host.processes.get_mut(&pid) {
                process.core.terminal.reset_timer(now);
            }
            info!(host = %host_id, tty = %tty, pid = %pid, "session recovered");
            return Some(pid);
        }
        if host.tty_in_use(tty) {
            debug!(host = %host_id, tty = %tty, "tty held by a non-terminal process");
            return None;
        }
        let cwd = host.get_home(user).unwrap_or_else(|| "/".to_string());
        let runnable = self.programs().instantiate(program)?;
        let spec = ProcessSpec::new(user)
            .cwd(cwd)
            .tty(tty)
            .size(TermSize::clamped(size.width, size.height))
            .origin(Origin::Terminal);
        let pid = self.start(host_id, spec, runnable)?;
        info!(host = %host_id, tty = %tty, pid = %pid, user, "session opened");
        Some(pid)
    }

    /// Takes at most one ready output packet from a session
    pub fn poll_output(&mut self, link: Link) -> Poll {
        let now = self.now();
        let Some(host) = self.hosts.get_mut(&link.host) else {
            return Poll::Closed;
        };
        if host.is_running(link.pid) {
            return Poll::Pending;
        }
        if let Some(process) = host.processes.get_mut(&link.pid) {
            let height = process.core.size.height;
            return match process.core.terminal.poll(now, height) {
                Some(text) => Poll::Ready(text),
                None => Poll::Pending,
            };
        }
        let Some((terminal, height)) = host.closed.get_mut(&link.pid) else {
            return Poll::Closed;
        };
        match terminal.poll(now, *height) {
            Some(text) => {
                if terminal.pending() == 0 {
                    host.closed.remove(&link.pid);
                }
                Poll::Ready(text)
            }
            None => Poll::Pending,
        }
    }

    /// Drains every packet that is ready now
    pub fn drain_output(&mut self, link: Link) -> String {
        let mut out = String::new();
        while let Poll::Ready(text) = self.poll_output(link) {
            out.push_str(&text);
        }
        out
    }

    /// Feeds client keystrokes into a session
    pub fn send_input(&mut self, link: Link, packet: Packet) -> bool {
        self.stdin(link, packet, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::program::{Driver, Runnable, Wait};
    use crate::test_utils::{
        online_host, test_simulation, test_simulation_with, EchoOnce, Idle, LineReader,
    };

    /// A terminal-rooted chain of `len` linked processes; `innermost` runs last
    fn linked_chain(
        sim: &mut Simulation,
        id: HostId,
        len: usize,
        innermost: Box<dyn Runnable>,
    ) -> Vec<Link> {
        let root = sim
            .start(
                id,
                ProcessSpec::new("root").origin(Origin::Terminal),
                Driver::boxed(Idle),
            )
            .unwrap();
        let mut chain = vec![Link::new(id, root)];
        let mut drivers: Vec<Box<dyn Runnable>> = (2..len).map(|_| Driver::boxed(Idle)).collect();
        drivers.push(innermost);
        for driver in drivers {
            let parent = chain[chain.len() - 1];
            let spec = ProcessSpec::new("root").origin(Origin::Process(parent));
            let child = Link::new(id, sim.start(id, spec, driver).unwrap());
            sim.process_mut(parent).unwrap().core.destin = Some(child);
            chain.push(child);
        }
        chain
    }

    fn shallow_relay_sim() -> Simulation {
        test_simulation_with(SimulationConfig {
            process_quota: 16,
            max_relay_depth: 3,
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_session_prints_and_closes() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let tty = sim.request_tty(id).unwrap();
        let pid = sim
            .open_session(id, "root", tty, TermSize::MIN, "echo")
            .unwrap();
        let link = Link::new(id, pid);
        sim.tick();
        assert_eq!(sim.drain_output(link), "hello\r\n");
        assert_eq!(sim.poll_output(link), Poll::Closed);
    }

    #[test]
    fn test_session_is_recovered_on_same_tty() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let tty = sim.request_tty(id).unwrap();
        let first = sim
            .open_session(id, "root", tty, TermSize::MIN, "idle")
            .unwrap();
        let again = sim
            .open_session(id, "root", tty, TermSize::MIN, "idle")
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(sim.host(id).unwrap().process_count(), 1);
    }

    #[test]
    fn test_input_is_buffered_without_child() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let pid = sim
            .start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
            .unwrap();
        let link = Link::new(id, pid);
        assert!(sim.send_input(link, Packet::new("x")));
        assert_eq!(sim.process(link).unwrap().buffered(), 1);
    }

    #[test]
    fn test_forwarded_input_reaches_child() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let parent = Link::new(
            id,
            sim.start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
                .unwrap(),
        );
        let child = Link::new(
            id,
            sim.start(
                id,
                ProcessSpec::new("root").origin(Origin::Process(parent)),
                Driver::boxed(Idle),
            )
            .unwrap(),
        );
        sim.process_mut(parent).unwrap().core.destin = Some(child);

        assert!(sim.send_input(parent, Packet::new("k")));
        assert_eq!(sim.process(parent).unwrap().buffered(), 0);
        assert_eq!(sim.process(child).unwrap().buffered(), 1);
    }

    #[test]
    fn test_stale_forward_link_falls_back_to_buffer() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let parent = Link::new(
            id,
            sim.start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
                .unwrap(),
        );
        sim.process_mut(parent).unwrap().core.destin = Some(Link::new(id, Pid::new(999)));

        assert!(sim.send_input(parent, Packet::new("k")));
        let core = sim.process(parent).unwrap();
        assert!(core.destin.is_none());
        assert_eq!(core.buffered(), 1);
    }

    #[test]
    fn test_child_output_reaches_terminal() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let tty = sim.request_tty(id).unwrap();
        let shell = Link::new(
            id,
            sim.open_session(id, "root", tty, TermSize::MIN, "idle")
                .unwrap(),
        );
        sim.start(
            id,
            ProcessSpec::new("root").origin(Origin::Process(shell)),
            Driver::boxed(EchoOnce::new("from child")),
        );
        sim.tick();
        assert_eq!(sim.drain_output(shell), "from child\r\n");
    }

    #[test]
    fn test_resize_follows_destin_and_prunes() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let parent = Link::new(
            id,
            sim.start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
                .unwrap(),
        );
        let child = Link::new(
            id,
            sim.start(
                id,
                ProcessSpec::new("root").origin(Origin::Process(parent)),
                Driver::boxed(Idle),
            )
            .unwrap(),
        );
        sim.process_mut(parent).unwrap().core.destin = Some(child);
        sim.process_mut(child).unwrap().core.destin = Some(Link::new(id, Pid::new(4242)));

        assert!(sim.resize(parent, TermSize::new(120, 40)));
        assert_eq!(sim.process(parent).unwrap().size, TermSize::new(120, 40));
        assert_eq!(sim.process(child).unwrap().size, TermSize::new(120, 40));
        assert!(sim.process(child).unwrap().destin.is_none());
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let link = Link::new(
            id,
            sim.start(id, ProcessSpec::new("root"), Driver::boxed(Idle))
                .unwrap(),
        );
        sim.resize(link, TermSize::new(20, 5));
        assert_eq!(sim.process(link).unwrap().size, TermSize::MIN);
    }

    #[test]
    fn test_stdin_to_offline_host_fails() {
        let mut sim = test_simulation();
        let id = online_host(&mut sim, "box");
        let reader = LineReader::default();
        let pid = sim
            .start(id, ProcessSpec::new("root"), Driver::boxed(reader.program()))
            .unwrap();
        sim.tick();
        assert_eq!(sim.process_wait(Link::new(id, pid)), Some(Wait::ReadLine));
        sim.shutdown(id);
        assert!(!sim.stdin(Link::new(id, pid), Packet::new("a"), true));
    }

    #[test]
    fn test_overlong_input_chain_keeps_links() {
        let mut sim = shallow_relay_sim();
        let id = online_host(&mut sim, "box");
        let chain = linked_chain(&mut sim, id, 8, Driver::boxed(Idle));

        assert!(!sim.send_input(chain[0], Packet::new("k")));
        for pair in chain.windows(2) {
            assert_eq!(sim.process(pair[0]).unwrap().destin, Some(pair[1]));
        }
        for link in &chain {
            assert_eq!(sim.process(*link).unwrap().buffered(), 0);
        }
    }

    #[test]
    fn test_overlong_output_chain_orphans_nobody() {
        let mut sim = shallow_relay_sim();
        let id = online_host(&mut sim, "box");
        let chain = linked_chain(&mut sim, id, 8, Driver::boxed(EchoOnce::new("deep")));
        let innermost = chain[7];

        sim.tick();
        assert!(!sim.is_live(innermost));
        sim.tick();
        for link in &chain[..7] {
            assert!(sim.is_live(*link));
            assert!(!sim.process(*link).unwrap().orphaned);
        }
        assert_eq!(sim.drain_output(chain[0]), "");
    }

    #[test]
    fn test_chain_within_depth_still_relays() {
        let mut sim = shallow_relay_sim();
        let id = online_host(&mut sim, "box");
        let chain = linked_chain(&mut sim, id, 3, Driver::boxed(Idle));

        assert!(sim.send_input(chain[0], Packet::new("k")));
        assert_eq!(sim.process(chain[2]).unwrap().buffered(), 1);
    }
}

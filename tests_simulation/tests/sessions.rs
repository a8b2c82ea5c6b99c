//! Terminal Session Integration Tests
//!
//! What a transport sees: opening sessions by program name, reattaching,
//! resizing and reading output after the process is gone.

use core_types::TermSize;
use sim_host::test_utils::{online_host, test_simulation, Idle};
use sim_host::{Driver, Link, Packet, Poll, ProcessSpec, Wait};
use tests_simulation::{init_tracing, run_ticks};

#[test]
fn test_output_outlives_session() {
    init_tracing();
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    let tty = sim.request_tty(host).unwrap();

    let pid = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "echo")
        .unwrap();
    let link = Link::new(host, pid);
    sim.tick();

    assert!(!sim.is_live(link));
    assert_eq!(sim.poll_output(link), Poll::Ready("hello\r\n".to_string()));
    assert_eq!(sim.poll_output(link), Poll::Closed);
}

#[test]
fn test_reattach_recovers_session() {
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    let tty = sim.request_tty(host).unwrap();

    let first = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "reader")
        .unwrap();
    sim.tick();
    let second = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "reader")
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(sim.host(host).unwrap().process_count(), 1);
    assert_eq!(sim.process_wait(Link::new(host, first)), Some(Wait::ReadLine));
}

#[test]
fn test_session_starts_in_home() {
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    sim.add_user(host, fs_guard::SUPERUSER, "alice").unwrap();
    let tty = sim.request_tty(host).unwrap();

    let pid = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "idle")
        .unwrap();
    let core = sim.process(Link::new(host, pid)).unwrap();
    assert_eq!(core.cwd, "/usr/alice");
    assert_eq!(core.tty, Some(tty));

    let tty = sim.request_tty(host).unwrap();
    let pid = sim
        .open_session(host, "bob", tty, TermSize::new(80, 24), "idle")
        .unwrap();
    assert_eq!(sim.process(Link::new(host, pid)).unwrap().cwd, "/");
}

#[test]
fn test_session_refusals() {
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    let tty = sim.request_tty(host).unwrap();

    sim.start(host, ProcessSpec::new("root").tty(tty), Driver::boxed(Idle))
        .unwrap();
    assert!(sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "idle")
        .is_none());

    let tty = sim.request_tty(host).unwrap();
    assert!(sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "missing")
        .is_none());

    sim.shutdown(host);
    assert!(sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "idle")
        .is_none());
}

#[test]
fn test_resize_clamps_and_reaches_children() {
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    let tty = sim.request_tty(host).unwrap();
    let pid = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "idle")
        .unwrap();
    let link = Link::new(host, pid);

    assert!(sim.resize(link, TermSize::new(1, 1)));
    assert_eq!(sim.process(link).unwrap().size, TermSize::MIN);

    assert!(sim.resize(link, TermSize::new(132, 50)));
    assert_eq!(sim.process(link).unwrap().size, TermSize::new(132, 50));

    sim.kill(link);
    assert!(!sim.resize(link, TermSize::new(80, 24)));
}

#[test]
fn test_typed_input_reaches_program() {
    let mut sim = test_simulation();
    let host = online_host(&mut sim, "shellbox");
    let tty = sim.request_tty(host).unwrap();
    let pid = sim
        .open_session(host, "alice", tty, TermSize::new(80, 24), "reader")
        .unwrap();
    let link = Link::new(host, pid);
    sim.tick();

    for ch in ["l", "s", "\r"] {
        sim.send_input(link, Packet::new(ch));
    }
    run_ticks(&mut sim, 2);
    assert_eq!(sim.drain_output(link), "> ls\r\n> ");
}

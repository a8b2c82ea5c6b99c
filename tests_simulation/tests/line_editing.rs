//! Interactive Input Integration Tests
//!
//! Line editing, single-key reads and paging, driven one keystroke per
//! tick through a terminal session.

use sim_host::test_utils::{test_simulation, KeyReader, LineReader, PagerDemo};
use sim_host::{Driver, Key, Packet, Wait};
use tests_simulation::{attach, init_tracing, run_ticks};

#[test]
fn test_readline_round_trip() {
    init_tracing();
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let reader = LineReader::default();
    let link = attach(&mut sim, host, "alice", Driver::boxed(reader.program()), &[]);

    sim.tick();
    assert_eq!(sim.process_wait(link), Some(Wait::ReadLine));
    assert_eq!(sim.drain_output(link), "> ");

    for ch in ["h", "e", "l", "l", "o"] {
        assert!(sim.send_input(link, Packet::new(ch)));
        sim.tick();
        assert_eq!(sim.process_wait(link), Some(Wait::ReadLine));
        assert!(reader.lines().is_empty());
    }
    assert_eq!(sim.drain_output(link), "hello");

    sim.send_input(link, Packet::new("\r"));
    sim.tick();
    assert_eq!(sim.process_wait(link), Some(Wait::Running));
    sim.tick();

    assert_eq!(reader.lines(), vec!["hello".to_string()]);
    assert_eq!(sim.process_wait(link), Some(Wait::ReadLine));
    assert_eq!(sim.drain_output(link), "\r\n> ");
}

#[test]
fn test_interrupt_runs_handler() {
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let reader = LineReader::default();
    let link = attach(&mut sim, host, "alice", Driver::boxed(reader.program()), &[]);
    sim.tick();

    sim.send_input(link, Packet::new("x"));
    sim.send_input(link, Packet::new("^C"));
    run_ticks(&mut sim, 2);

    assert_eq!(reader.interrupts(), 1);
    assert!(reader.lines().is_empty());
    assert_eq!(sim.drain_output(link), "> x^C\r\n> ");
}

#[test]
fn test_exit_line_ends_session() {
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let reader = LineReader::default();
    let link = attach(&mut sim, host, "alice", Driver::boxed(reader.program()), &[]);
    sim.tick();
    for ch in ["e", "x", "i", "t", "\r"] {
        sim.send_input(link, Packet::new(ch));
    }
    run_ticks(&mut sim, 3);

    assert!(!sim.is_live(link));
    assert!(reader.lines().is_empty());
}

#[test]
fn test_readchar_filters_keys() {
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let keys = KeyReader::default();
    let link = attach(&mut sim, host, "alice", Driver::boxed(keys.program()), &[]);
    sim.tick();
    assert_eq!(sim.process_wait(link), Some(Wait::ReadChar));

    sim.send_input(link, Packet::new("q"));
    sim.tick();
    assert_eq!(sim.process_wait(link), Some(Wait::ReadChar));

    sim.send_input(link, Packet::new("y"));
    run_ticks(&mut sim, 2);

    assert_eq!(keys.seen(), Some(Key::Char('y')));
    assert!(!sim.is_live(link));
    assert_eq!(sim.drain_output(link), "Continue? [y/n] y\r\n");
}

#[test]
fn test_pager_scrolls_and_quits() {
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let link = attach(&mut sim, host, "alice", Driver::boxed(PagerDemo::new(40)), &[]);
    sim.tick();
    assert_eq!(sim.process_wait(link), Some(Wait::Pager));
    let first = sim.drain_output(link);
    assert!(first.starts_with("line 1\r\n"));
    assert!(first.contains("line 23\r\n"));
    assert!(!first.contains("line 24\r\n"));
    assert!(first.ends_with("--More--(57%)"));

    sim.send_input(link, Packet::new("down"));
    sim.tick();
    assert!(sim.drain_output(link).contains("line 24\r\n"));

    sim.send_input(link, Packet::new("q"));
    run_ticks(&mut sim, 2);
    assert!(sim.drain_output(link).ends_with("done\r\n"));
    assert!(!sim.is_live(link));
}

#[test]
fn test_short_text_skips_pager() {
    let mut sim = test_simulation();
    let host = sim.create_host("term").unwrap();
    sim.startup(host, false);

    let link = attach(&mut sim, host, "alice", Driver::boxed(PagerDemo::new(3)), &[]);
    run_ticks(&mut sim, 2);
    assert_eq!(
        sim.drain_output(link),
        "line 1\r\nline 2\r\nline 3\r\ndone\r\n"
    );
}

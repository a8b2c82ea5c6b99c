//! Process Table Integration Tests
//!
//! PID and TTY allocation under load:
//! - PIDs stay distinct and in range until the pool runs dry
//! - Exhausted pools report "no slot" instead of failing
//! - Freed slots are handed out again

use sim_host::test_utils::{test_simulation, test_simulation_with, Idle};
use sim_host::{Driver, Link, ProcessSpec, SimulationConfig};
use std::collections::HashSet;
use tests_simulation::init_tracing;

#[test]
fn test_pids_distinct_until_pool_exhausted() {
    init_tracing();
    let config = SimulationConfig {
        pid_ceiling: 64,
        ..SimulationConfig::default()
    };
    let mut sim = test_simulation_with(config);
    let host = sim.create_host("busy").unwrap();
    sim.startup(host, false);

    let mut seen = HashSet::new();
    for _ in 0..63 {
        let pid = sim
            .start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
            .unwrap();
        assert!((1..64).contains(&pid.get()), "pid {} out of range", pid);
        assert!(seen.insert(pid), "pid {} handed out twice", pid);
    }

    assert!(sim
        .start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
        .is_none());
    assert_eq!(sim.host(host).unwrap().process_count(), 63);
}

#[test]
fn test_pids_survive_ticks() {
    let mut sim = test_simulation();
    let host = sim.create_host("steady").unwrap();
    sim.startup(host, false);

    let pids: Vec<_> = (0..20)
        .map(|_| {
            sim.start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
                .unwrap()
        })
        .collect();
    for _ in 0..5 {
        sim.tick();
    }
    let mut live = sim.host(host).unwrap().pids();
    live.sort();
    assert_eq!(live, pids);
}

#[test]
fn test_freed_pid_reused_after_wrap() {
    let config = SimulationConfig {
        pid_ceiling: 4,
        ..SimulationConfig::default()
    };
    let mut sim = test_simulation_with(config);
    let host = sim.create_host("small").unwrap();
    sim.startup(host, false);

    let first = sim
        .start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
        .unwrap();
    for _ in 0..2 {
        sim.start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
            .unwrap();
    }
    assert!(sim.kill(Link::new(host, first)));

    let again = sim
        .start(host, ProcessSpec::new("root"), Driver::boxed(Idle))
        .unwrap();
    assert_eq!(again, first);
}

#[test]
fn test_tty_pool_exhaustion() {
    init_tracing();
    let mut sim = test_simulation();
    let host = sim.create_host("ttys").unwrap();
    sim.startup(host, false);

    let config = sim.config().clone();
    let pool = (config.tty_ceiling - config.tty_reserved) as usize;
    assert_eq!(pool, 192);

    let mut held = Vec::new();
    for _ in 0..pool {
        let tty = sim.request_tty(host).unwrap();
        assert!(tty.get() >= config.tty_reserved && tty.get() < config.tty_ceiling);
        let pid = sim
            .start(host, ProcessSpec::new("root").tty(tty), Driver::boxed(Idle))
            .unwrap();
        held.push((pid, tty));
    }

    assert!(sim.request_tty(host).is_none());

    let distinct: HashSet<_> = held.iter().map(|(_, tty)| *tty).collect();
    assert_eq!(distinct.len(), pool);
    for (pid, tty) in &held {
        assert_eq!(sim.process(Link::new(host, *pid)).unwrap().tty, Some(*tty));
    }

    let (pid, tty) = held[10];
    sim.kill(Link::new(host, pid));
    assert_eq!(sim.request_tty(host), Some(tty));
}

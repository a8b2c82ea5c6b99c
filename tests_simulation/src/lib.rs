//! Simulation Test Utilities
//!
//! Shared setup for the end-to-end tests of the host simulation.
//!
//! ## Test Philosophy
//!
//! - **Observable behavior only**: tests drive the engine through ticks,
//!   input packets and terminal output, the way a transport would
//! - **Deterministic**: virtual time only moves when a test advances it

use core_types::{HostId, TermSize};
use sim_host::{Link, Origin, ProcessSpec, Runnable, Simulation};

/// Routes engine logs to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Starts `program` as a terminal-attached process on a fresh tty
pub fn attach(
    sim: &mut Simulation,
    host: HostId,
    user: &str,
    program: Box<dyn Runnable>,
    params: &[&str],
) -> Link {
    let Some(tty) = sim.request_tty(host) else {
        panic!("no free tty on {}", host);
    };
    let spec = ProcessSpec::new(user)
        .tty(tty)
        .size(TermSize::new(80, 24))
        .params(params.iter().copied())
        .origin(Origin::Terminal);
    match sim.start(host, spec, program) {
        Some(pid) => Link::new(host, pid),
        None => panic!("unable to start terminal process on {}", host),
    }
}

/// Ticks `n` times
pub fn run_ticks(sim: &mut Simulation, n: usize) {
    for _ in 0..n {
        sim.tick();
    }
}

//! # Host Simulation Engine
//!
//! Simulates many networked hosts inside one deterministic process.
//!
//! ## Model
//!
//! - A [`Simulation`] owns hosts; a [`Host`] owns a filesystem, a process
//!   table and a run queue
//! - Programs are state machines ([`Program`]); each scheduling slot runs
//!   one step and the step returns a [`Continuation`]
//! - Input flows down the `destin` chain, output flows up the `origin`
//!   chain, and a dead link is detected when it is next used
//! - Hosts are addressed with DCA addresses (`p.r.h`) and resolved through
//!   the router hierarchy
//!
//! ## Philosophy
//!
//! Time is virtual and only moves when the caller advances it. A tick
//! visits hosts in registry order and never blocks, so the same inputs
//! always produce the same output.
//!
//! A program may fail in two ways. Domain errors ([`host_api::OsError`],
//! [`host_api::ValueError`]) are printed to the process's terminal. Any
//! other failure, including a panic, is recorded as an incident and the
//! user only sees its id.

pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod input;
pub mod network;
pub mod process;
pub mod program;
pub mod programs;
pub mod relay;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod test_utils;

pub use config::SimulationConfig;
pub use context::{LineOptions, ProcessContext};
pub use error::{ProcessError, SnapshotError};
pub use host::{validate_hostname, Host};
pub use input::{Key, Packet};
pub use process::{Link, Origin, ProcessCore, ProcessSpec};
pub use program::{Continuation, Driver, Flow, Program, Runnable, Wait};
pub use programs::{Constructor, ProgramTable};
pub use relay::Poll;
pub use simulation::Simulation;

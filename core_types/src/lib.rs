//! # Core Types
//!
//! This crate defines the fundamental types shared by every part of the host
//! simulation.
//!
//! ## Philosophy
//!
//! - **Ids, not references**: hosts and processes point at each other through
//!   lookup keys, so a dead or removed entity fails lookup instead of dangling.
//! - **Type safety first**: a `Pid` cannot be confused with a `Tty`.
//!
//! ## Key Types
//!
//! - [`HostId`]: Unique identifier for a simulated host
//! - [`Pid`]: Process identifier, unique per host while alive
//! - [`Tty`]: Logical terminal slot on a host
//! - [`IncidentId`]: Opaque id for an internal fault report
//! - [`TermSize`]: Terminal geometry

pub mod ids;
pub mod terminal;

pub use ids::{HostId, IncidentId, Pid, Tty};
pub use terminal::TermSize;

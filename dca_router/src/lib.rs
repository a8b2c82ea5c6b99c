//! # DCA Router
//!
//! Hierarchical addressing for simulated hosts.
//!
//! ## Design
//!
//! - An address is three partitions `isp.router.host`; `0.0.0` is loopback
//! - Routers and ISP routers own an [`AddressTable`] for the partition below
//!   them; plain hosts own nothing and defer to their gateway
//! - Resolution walks the hierarchy through the [`Topology`] trait and
//!   re-checks power and safe mode at every hop
//!
//! The router never holds hosts. It borrows a registry view for the length
//! of one resolution and hands back a [`HostId`](core_types::HostId).

pub mod dca;
pub mod resolve;
pub mod table;

pub use dca::{Dca, PARTITION_LIMIT};
pub use resolve::{AddressRouter, NetworkNode, NodeRole, Topology, MAX_HOPS};
pub use table::AddressTable;

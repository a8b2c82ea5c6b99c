//! Address resolution across the host hierarchy

use crate::dca::Dca;
use crate::table::AddressTable;
use core_types::HostId;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Upper bound on delegations during one resolution
///
/// A well-formed hierarchy needs at most five hops (host, router, ISP, peer
/// ISP, router); the bound stops gateway cycles.
pub const MAX_HOPS: usize = 16;

/// Routing responsibility of a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum NodeRole {
    /// Leaf host; everything but itself goes to its gateway
    #[default]
    Plain,
    /// Owns the host partition of its `isp.router` prefix
    Router { hosts: AddressTable },
    /// Owns the router partition of its `isp` prefix
    IspRouter { routers: AddressTable },
}

impl NodeRole {
    pub fn router() -> Self {
        NodeRole::Router {
            hosts: AddressTable::new(),
        }
    }

    pub fn isp_router() -> Self {
        NodeRole::IspRouter {
            routers: AddressTable::new(),
        }
    }

    pub fn is_isp(&self) -> bool {
        matches!(self, NodeRole::IspRouter { .. })
    }
}

/// What resolution needs to know about one node
pub trait NetworkNode {
    fn dca(&self) -> Option<Dca>;
    fn is_online(&self) -> bool;
    fn in_safe_mode(&self) -> bool;
    fn gateway(&self) -> Option<HostId>;
    fn role(&self) -> &NodeRole;

    /// Powered on and not isolated
    fn is_reachable(&self) -> bool {
        self.is_online() && !self.in_safe_mode()
    }
}

/// Registry view used by the router
pub trait Topology {
    type Node: NetworkNode;

    fn node(&self, id: HostId) -> Option<&Self::Node>;

    /// Every ISP router, in registry order
    fn isp_routers(&self) -> Vec<HostId>;
}

/// Resolves addresses from the perspective of a given host
pub struct AddressRouter<'a, T: Topology> {
    topology: &'a T,
}

impl<'a, T: Topology> AddressRouter<'a, T> {
    pub fn new(topology: &'a T) -> Self {
        Self { topology }
    }

    /// Resolves textual `address` as seen from `from`
    ///
    /// Returns `None` for malformed addresses, unknown targets, and targets
    /// behind an offline or isolated hop.
    pub fn resolve(&self, from: HostId, address: &str) -> Option<HostId> {
        let target = Dca::parse(address).ok()?;
        self.resolve_dca(from, target)
    }

    pub fn resolve_dca(&self, from: HostId, target: Dca) -> Option<HostId> {
        let found = self.step(from, target, 0);
        trace!(from = %from, target = %target, found = ?found, "resolve");
        found
    }

    fn step(&self, at: HostId, target: Dca, hops: usize) -> Option<HostId> {
        if hops > MAX_HOPS {
            return None;
        }
        let node = self.topology.node(at)?;
        if !node.is_online() {
            return None;
        }
        if target.is_loopback() || node.dca() == Some(target) {
            return Some(at);
        }
        if node.in_safe_mode() {
            return None;
        }

        match node.role() {
            NodeRole::Plain => self.delegate(node.gateway()?, target, hops),
            NodeRole::Router { hosts } => match node.dca() {
                Some(own) if own.same_router(&target) => {
                    let id = hosts.get(target.host())?;
                    let host = self.topology.node(id)?;
                    (host.is_reachable() && host.dca() == Some(target)).then_some(id)
                }
                _ => self.delegate(node.gateway()?, target, hops),
            },
            NodeRole::IspRouter { routers } => {
                let own = node.dca()?;
                if own.same_isp(&target) {
                    let router = routers.get(target.router())?;
                    self.delegate(router, target, hops)
                } else {
                    let peer = self.topology.isp_routers().into_iter().find(|id| {
                        *id != at
                            && self
                                .topology
                                .node(*id)
                                .and_then(|n| n.dca())
                                .is_some_and(|d| d.same_isp(&target))
                    })?;
                    self.delegate(peer, target, hops)
                }
            }
        }
    }

    fn delegate(&self, next: HostId, target: Dca, hops: usize) -> Option<HostId> {
        let node = self.topology.node(next)?;
        if !node.is_reachable() {
            return None;
        }
        self.step(next, target, hops + 1)
    }
}

//! Address assignment and resolution over the host registry

use crate::host::Host;
use crate::simulation::Simulation;
use core_types::HostId;
use dca_router::{AddressRouter, Dca, NodeRole, Topology};
use tracing::info;

impl Topology for Simulation {
    type Node = Host;

    fn node(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    fn isp_routers(&self) -> Vec<HostId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.hosts.get(id).is_some_and(|h| h.role.is_isp()))
            .collect()
    }
}

impl Simulation {
    /// Resolves `address` as seen from `from`
    pub fn resolve(&self, from: HostId, address: &str) -> Option<HostId> {
        AddressRouter::new(self).resolve(from, address)
    }

    /// Makes `id` an ISP router and gives it a top-level partition `p.0.0`
    pub fn assign_isp(&mut self, id: HostId) -> Option<Dca> {
        let gateway = self.hosts.get(&id)?.gateway;
        if gateway.is_some() {
            self.release_address(id);
        }
        let slot = self.isp_table.assign(id)?;
        let dca = Dca::for_isp(slot);
        self.change_role(id, NodeRole::isp_router());
        let host = self.hosts.get_mut(&id)?;
        host.dca = Some(dca);
        host.gateway = None;
        self.readdress_children(id, Some(dca));
        info!(host = %id, dca = %dca, "ISP address assigned");
        Some(dca)
    }

    /// Makes `router` a router under `isp` with address `p.r.0`
    pub fn assign_router(&mut self, isp: HostId, router: HostId) -> Option<Dca> {
        if isp == router || !self.hosts.contains_key(&router) {
            return None;
        }
        let isp_dca = self.hosts.get(&isp).filter(|h| h.role.is_isp())?.dca?;
        let current = self.hosts.get(&router)?.gateway;
        if current != Some(isp) {
            self.release_address(router);
        }
        let slot = match &mut self.hosts.get_mut(&isp)?.role {
            NodeRole::IspRouter { routers } => routers.assign(router)?,
            _ => return None,
        };
        let dca = isp_dca.for_router(slot);
        self.change_role(router, NodeRole::router());
        let host = self.hosts.get_mut(&router)?;
        host.dca = Some(dca);
        host.gateway = Some(isp);
        self.readdress_children(router, Some(dca));
        info!(host = %router, isp = %isp, dca = %dca, "router address assigned");
        Some(dca)
    }

    /// Attaches `host` to `router` with address `p.r.h`
    pub fn assign_host(&mut self, router: HostId, host: HostId) -> Option<Dca> {
        if router == host || !self.hosts.contains_key(&host) {
            return None;
        }
        let router_dca = self
            .hosts
            .get(&router)
            .filter(|h| matches!(h.role, NodeRole::Router { .. }))?
            .dca?;
        let current = self.hosts.get(&host)?.gateway;
        if current != Some(router) {
            self.release_address(host);
        }
        let slot = match &mut self.hosts.get_mut(&router)?.role {
            NodeRole::Router { hosts } => hosts.assign(host)?,
            _ => return None,
        };
        let dca = router_dca.for_host(slot);
        self.change_role(host, NodeRole::Plain);
        let node = self.hosts.get_mut(&host)?;
        node.dca = Some(dca);
        node.gateway = Some(router);
        info!(host = %host, router = %router, dca = %dca, "host address assigned");
        Some(dca)
    }

    /// Frees the slot `id` holds in its owner's table and detaches it
    pub fn release_address(&mut self, id: HostId) -> bool {
        let Some(host) = self.hosts.get(&id) else {
            return false;
        };
        let had_address = host.dca.is_some();
        let released = match host.gateway {
            Some(owner) => match self.hosts.get_mut(&owner).map(|h| &mut h.role) {
                Some(NodeRole::Router { hosts }) => hosts.release(id).is_some(),
                Some(NodeRole::IspRouter { routers }) => routers.release(id).is_some(),
                _ => false,
            },
            None => self.isp_table.release(id).is_some(),
        };
        if let Some(host) = self.hosts.get_mut(&id) {
            host.dca = None;
            host.gateway = None;
        }
        if released {
            info!(host = %id, "address released");
        }
        released || had_address
    }

    /// Gives `id` a new role unless it already has one of the same kind
    ///
    /// Hosts and routers the old table handed out are detached, and their
    /// own dependents lose their addresses until they are reattached.
    fn change_role(&mut self, id: HostId, role: NodeRole) {
        let Some(host) = self.hosts.get_mut(&id) else {
            return;
        };
        if std::mem::discriminant(&host.role) == std::mem::discriminant(&role) {
            return;
        }
        let old = std::mem::replace(&mut host.role, role);
        let children: Vec<HostId> = match &old {
            NodeRole::Plain => return,
            NodeRole::Router { hosts } => hosts.iter().map(|(_, h)| h).collect(),
            NodeRole::IspRouter { routers } => routers.iter().map(|(_, h)| h).collect(),
        };
        for child in children {
            if let Some(node) = self.hosts.get_mut(&child) {
                node.dca = None;
                node.gateway = None;
            }
            self.readdress_children(child, None);
        }
        info!(host = %id, "role changed; dependents detached");
    }

    /// Rewrites the prefix of everything a routing node has handed out
    ///
    /// With no address the dependents keep their slots but lose their
    /// addresses.
    fn readdress_children(&mut self, owner: HostId, dca: Option<Dca>) {
        let children: Vec<(u16, HostId, bool)> = match &self.hosts.get(&owner).map(|h| &h.role) {
            Some(NodeRole::Router { hosts }) => hosts.iter().map(|(s, h)| (s, h, false)).collect(),
            Some(NodeRole::IspRouter { routers }) => {
                routers.iter().map(|(s, h)| (s, h, true)).collect()
            }
            _ => return,
        };
        for (slot, child, is_router) in children {
            let address = dca.map(|dca| match is_router {
                true => dca.for_router(slot),
                false => dca.for_host(slot),
            });
            if let Some(host) = self.hosts.get_mut(&child) {
                host.dca = address;
            }
            if is_router {
                self.readdress_children(child, address);
            }
        }
    }
}

//! Peer registry
//!
//! Peers are kept in a bounded pool and linked in insertion order. Lookups by
//! connection handle walk that list; the number of simultaneous connections is
//! small enough that a map would only add allocation.

use super::lookup::PeerRef;
use super::tree::{AttributeTree, Released, ServiceNode};
use crate::addr::BdAddr;
use crate::config::PoolCapacities;
use crate::discovery::engine::Session;
use crate::error::{PeerError, PeerResult};
use crate::pool::{Linked, NodeId, NodeKind, NodeList, Pool, PoolStats};
use log::debug;
use std::ops::ControlFlow;

pub(crate) struct PeerNode {
    pub conn_handle: u16,
    pub addr: BdAddr,
    pub mtu: u16,
    pub services: NodeList<ServiceNode>,
    /// In-flight discovery session, if any
    pub session: Option<Session>,
    /// Outcome of the most recent finished session
    pub outcome: Option<PeerResult<()>>,
    next: Option<NodeId<PeerNode>>,
}

impl PeerNode {
    fn new(conn_handle: u16) -> Self {
        Self {
            conn_handle,
            addr: BdAddr::ZERO,
            mtu: 0,
            services: NodeList::new(),
            session: None,
            outcome: None,
            next: None,
        }
    }
}

impl Linked for PeerNode {
    fn next(&self) -> Option<NodeId<Self>> {
        self.next
    }

    fn set_next(&mut self, next: Option<NodeId<Self>>) {
        self.next = next;
    }
}

/// Usage of every pool of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    pub peers: PoolStats,
    pub services: PoolStats,
    pub included_services: PoolStats,
    pub characteristics: PoolStats,
    pub descriptors: PoolStats,
}

impl PoolUsage {
    /// Nodes currently allocated across all pools
    pub fn in_use(&self) -> usize {
        self.all().iter().map(|s| s.in_use).sum()
    }

    pub fn all(&self) -> [PoolStats; 5] {
        [
            self.peers,
            self.services,
            self.included_services,
            self.characteristics,
            self.descriptors,
        ]
    }
}

pub(crate) struct PeerRegistry {
    peers: Pool<PeerNode>,
    order: NodeList<PeerNode>,
    pub(crate) tree: AttributeTree,
}

impl PeerRegistry {
    pub fn new(capacities: &PoolCapacities) -> Self {
        Self {
            peers: Pool::with_capacity(NodeKind::Peer, capacities.max_peers),
            order: NodeList::new(),
            tree: AttributeTree::new(capacities),
        }
    }

    /// Register a new connection with an empty tree
    pub fn add(&mut self, conn_handle: u16) -> PeerResult<NodeId<PeerNode>> {
        if self.lookup(conn_handle).is_some() {
            return Err(PeerError::Duplicate(conn_handle));
        }

        let id = self
            .peers
            .push_back(&mut self.order, PeerNode::new(conn_handle))?;
        debug!("Added peer for connection 0x{:04X}", conn_handle);
        Ok(id)
    }

    /// Remove a connection and release its whole tree.
    ///
    /// An in-flight session is dropped with the peer; its callback never runs
    /// and any event still addressed to it no longer resolves.
    pub fn delete(&mut self, conn_handle: u16) -> PeerResult<Released> {
        let id = self.lookup(conn_handle).ok_or(PeerError::NotFound)?;

        let released = self.clear_tree(id);
        self.peers.unlink(&mut self.order, id);
        if let Some(peer) = self.peers.release(id) {
            if peer.session.is_some() {
                debug!(
                    "Dropped in-flight discovery for connection 0x{:04X}",
                    conn_handle
                );
            }
        }

        debug!(
            "Deleted peer for connection 0x{:04X} ({} attribute records released)",
            conn_handle,
            released.total()
        );
        Ok(released)
    }

    /// Release the services of a peer, leaving the peer itself registered
    pub fn clear_tree(&mut self, id: NodeId<PeerNode>) -> Released {
        match self.peers.get_mut(id) {
            Some(peer) => self.tree.release_services(&mut peer.services),
            None => Released::default(),
        }
    }

    pub fn lookup(&self, conn_handle: u16) -> Option<NodeId<PeerNode>> {
        self.peers
            .iter(&self.order)
            .find(|(_, peer)| peer.conn_handle == conn_handle)
            .map(|(id, _)| id)
    }

    pub fn find(&self, conn_handle: u16) -> PeerResult<PeerRef<'_>> {
        let id = self.lookup(conn_handle).ok_or(PeerError::NotFound)?;
        self.peer_ref(id).ok_or(PeerError::NotFound)
    }

    pub fn peer_ref(&self, id: NodeId<PeerNode>) -> Option<PeerRef<'_>> {
        self.peers
            .get(id)
            .map(|node| PeerRef::new(&self.tree, node))
    }

    pub fn peer(&self, id: NodeId<PeerNode>) -> Option<&PeerNode> {
        self.peers.get(id)
    }

    pub fn peer_mut(&mut self, id: NodeId<PeerNode>) -> Option<&mut PeerNode> {
        self.peers.get_mut(id)
    }

    /// Split borrow of one peer and the shared tree pools
    pub fn peer_and_tree(
        &mut self,
        id: NodeId<PeerNode>,
    ) -> Option<(&mut PeerNode, &mut AttributeTree)> {
        let peer = self.peers.get_mut(id)?;
        Some((peer, &mut self.tree))
    }

    /// Visit peers in registry order until `visit` breaks
    pub fn traverse<B>(&self, mut visit: impl FnMut(PeerRef<'_>) -> ControlFlow<B>) -> Option<B> {
        for (_, node) in self.peers.iter(&self.order) {
            if let ControlFlow::Break(value) = visit(PeerRef::new(&self.tree, node)) {
                return Some(value);
            }
        }
        None
    }

    pub fn set_mtu(&mut self, conn_handle: u16, mtu: u16) -> PeerResult<()> {
        let id = self.lookup(conn_handle).ok_or(PeerError::NotFound)?;
        let peer = self.peers.get_mut(id).ok_or(PeerError::NotFound)?;
        peer.mtu = mtu;
        Ok(())
    }

    pub fn get_mtu(&self, conn_handle: u16) -> PeerResult<u16> {
        self.find(conn_handle).map(|peer| peer.mtu())
    }

    #[cfg(feature = "addr-resolution")]
    pub fn set_addr(&mut self, conn_handle: u16, addr: BdAddr) -> PeerResult<()> {
        let id = self.lookup(conn_handle).ok_or(PeerError::NotFound)?;
        let peer = self.peers.get_mut(id).ok_or(PeerError::NotFound)?;
        peer.addr = addr;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn usage(&self) -> PoolUsage {
        let [services, included_services, characteristics, descriptors] = self.tree.stats();
        PoolUsage {
            peers: self.peers.stats(),
            services,
            included_services,
            characteristics,
            descriptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::types::{CharacteristicProperty, GattCharacteristic, GattService};

    fn registry(max_peers: usize) -> PeerRegistry {
        PeerRegistry::new(&PoolCapacities::new(max_peers, 4, 4, 4))
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut registry = registry(3);
        registry.add(1).unwrap();

        assert_eq!(registry.add(1).err(), Some(PeerError::Duplicate(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_reports_exhaustion() {
        let mut registry = registry(1);
        registry.add(1).unwrap();

        assert_eq!(
            registry.add(2).err(),
            Some(PeerError::OutOfMemory(NodeKind::Peer))
        );
    }

    #[test]
    fn test_delete_unknown_fails_every_time() {
        let mut registry = registry(2);
        registry.add(7).unwrap();

        assert!(registry.delete(7).is_ok());
        assert_eq!(registry.delete(7).err(), Some(PeerError::NotFound));
        assert_eq!(registry.delete(7).err(), Some(PeerError::NotFound));
        assert!(registry.find(7).is_err());
    }

    #[test]
    fn test_delete_releases_tree() {
        let mut registry = registry(1);
        let id = registry.add(3).unwrap();

        let (peer, tree) = registry.peer_and_tree(id).unwrap();
        let svc = tree
            .add_service(&mut peer.services, GattService::new(1, 8, 0x180Fu16))
            .unwrap()
            .unwrap();
        tree.add_characteristic(
            svc,
            GattCharacteristic::new(2, 3, CharacteristicProperty::READ, 0x2A19u16),
        )
        .unwrap();
        assert_eq!(registry.usage().in_use(), 3);

        let released = registry.delete(3).unwrap();
        assert_eq!(released.total() + 1, 3);
        assert_eq!(registry.usage().in_use(), 0);
    }

    #[test]
    fn test_traverse_stops_early() {
        let mut registry = registry(4);
        for conn in [10, 20, 30, 40] {
            registry.add(conn).unwrap();
        }
        registry.set_mtu(30, 247).unwrap();

        let mut visited = Vec::new();
        let found = registry.traverse(|peer| {
            visited.push(peer.conn_handle());
            if peer.mtu() > 23 {
                ControlFlow::Break(peer.conn_handle())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(found, Some(30));
        assert_eq!(visited, vec![10, 20, 30]);
    }

    #[test]
    fn test_mtu_and_addr() {
        let mut registry = registry(2);
        registry.add(5).unwrap();

        assert_eq!(registry.get_mtu(5), Ok(0));
        registry.set_mtu(5, 185).unwrap();
        assert_eq!(registry.get_mtu(5), Ok(185));
        assert_eq!(registry.set_mtu(6, 23), Err(PeerError::NotFound));
        assert_eq!(registry.get_mtu(6), Err(PeerError::NotFound));
        assert_eq!(registry.find(5).unwrap().addr(), BdAddr::ZERO);

        #[cfg(feature = "addr-resolution")]
        {
            let addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
            registry.set_addr(5, addr).unwrap();
            assert_eq!(registry.find(5).unwrap().addr(), addr);
        }
    }
}

//! Peer cache
//!
//! Owns the registry, every node pool and the discovery service. The cache is
//! meant to be driven from a single host task; share it across threads with
//! [`PeerCache::into_shared`].

use crate::config::PeerCacheConfig;
#[cfg(feature = "addr-resolution")]
use crate::addr::BdAddr;
use crate::error::PeerResult;
use crate::peer::lookup::PeerRef;
use crate::peer::registry::{PeerRegistry, PoolUsage};
use log::{debug, warn};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

/// A cache shared between host tasks
pub type SharedPeerCache<D> = Arc<Mutex<PeerCache<D>>>;

/// Per-connection cache of remote GATT attribute tables
pub struct PeerCache<D> {
    pub(crate) registry: PeerRegistry,
    pub(crate) discovery: D,
    pub(crate) config: PeerCacheConfig,
    pub(crate) next_session: u32,
}

impl<D> PeerCache<D> {
    /// Create a cache with every pool sized up front.
    ///
    /// No node storage is allocated after this returns.
    pub fn new(config: PeerCacheConfig, discovery: D) -> PeerResult<Self> {
        config.capacities.validate()?;
        if config.discover_included && config.capacities.max_included_services == 0 {
            warn!("Included service discovery enabled without included service capacity");
        }

        debug!("Creating peer cache with {:?}", config.capacities);
        Ok(Self {
            registry: PeerRegistry::new(&config.capacities),
            discovery,
            config,
            next_session: 0,
        })
    }

    /// Register a new connection
    pub fn add(&mut self, conn_handle: u16) -> PeerResult<()> {
        self.registry.add(conn_handle).map(|_| ())
    }

    /// Remove a connection with its attribute tree.
    ///
    /// A discovery session still running on it is abandoned: its callback
    /// never runs.
    pub fn delete(&mut self, conn_handle: u16) -> PeerResult<()> {
        self.registry.delete(conn_handle).map(|_| ())
    }

    pub fn find(&self, conn_handle: u16) -> PeerResult<PeerRef<'_>> {
        self.registry.find(conn_handle)
    }

    pub fn contains(&self, conn_handle: u16) -> bool {
        self.registry.lookup(conn_handle).is_some()
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every peer in registration order until `visit` breaks, returning
    /// the break value
    pub fn traverse<B>(&self, visit: impl FnMut(PeerRef<'_>) -> ControlFlow<B>) -> Option<B> {
        self.registry.traverse(visit)
    }

    pub fn set_mtu(&mut self, conn_handle: u16, mtu: u16) -> PeerResult<()> {
        self.registry.set_mtu(conn_handle, mtu)
    }

    pub fn get_mtu(&self, conn_handle: u16) -> PeerResult<u16> {
        self.registry.get_mtu(conn_handle)
    }

    /// Replace the cached address of a peer once its identity is resolved
    #[cfg(feature = "addr-resolution")]
    pub fn set_addr(&mut self, conn_handle: u16, addr: BdAddr) -> PeerResult<()> {
        self.registry.set_addr(conn_handle, addr)
    }

    pub fn pool_usage(&self) -> PoolUsage {
        self.registry.usage()
    }

    pub fn config(&self) -> &PeerCacheConfig {
        &self.config
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn discovery_mut(&mut self) -> &mut D {
        &mut self.discovery
    }

    pub fn into_shared(self) -> SharedPeerCache<D> {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolCapacities;
    use crate::error::PeerError;
    use crate::pool::NodeKind;

    fn cache(max_peers: usize) -> PeerCache<()> {
        PeerCache::new(
            PeerCacheConfig::new(PoolCapacities::new(max_peers, 2, 2, 2)),
            (),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_zero_peers() {
        let config = PeerCacheConfig::new(PoolCapacities::new(0, 1, 1, 1));
        assert!(matches!(
            PeerCache::new(config, ()),
            Err(PeerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_add_find_delete() {
        let mut cache = cache(2);
        assert!(cache.is_empty());

        cache.add(1).unwrap();
        cache.add(2).unwrap();
        assert_eq!(cache.add(3), Err(PeerError::OutOfMemory(NodeKind::Peer)));
        assert_eq!(cache.add(2), Err(PeerError::Duplicate(2)));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.find(2).unwrap().conn_handle(), 2);
        cache.delete(2).unwrap();
        assert!(!cache.contains(2));
        assert_eq!(cache.delete(2), Err(PeerError::NotFound));

        // The freed slot is reusable
        cache.add(3).unwrap();
        assert_eq!(cache.pool_usage().peers.in_use, 2);
    }

    #[test]
    fn test_traverse_in_registration_order() {
        let mut cache = cache(3);
        for conn in [9, 4, 7] {
            cache.add(conn).unwrap();
        }

        let mut seen = Vec::new();
        let none: Option<()> = cache.traverse(|peer| {
            seen.push(peer.conn_handle());
            ControlFlow::Continue(())
        });

        assert_eq!(none, None);
        assert_eq!(seen, vec![9, 4, 7]);
    }

    #[cfg(feature = "addr-resolution")]
    #[test]
    fn test_set_addr() {
        let mut cache = cache(1);
        cache.add(1).unwrap();

        let addr: BdAddr = "C0:FF:EE:00:11:22".parse().unwrap();
        cache.set_addr(1, addr).unwrap();
        assert_eq!(cache.find(1).unwrap().addr(), addr);
        assert_eq!(cache.set_addr(2, addr), Err(PeerError::NotFound));
    }
}

//! GATT discovery
//!
//! The cache does not speak ATT itself. It drives an external discovery
//! service through [`GattDiscovery`]: every request starts one asynchronous
//! round, and the service answers by feeding zero or more item events followed
//! by exactly one [`DiscoveryEvent::Complete`] into
//! [`PeerCache::handle_event`](crate::PeerCache::handle_event), together with
//! the [`SessionToken`] it was given.

pub mod engine;
pub mod types;


pub use engine::{DiscoveryCallback, DiscoveryState};
pub use types::{
    CharacteristicProperty, GattCharacteristic, GattDescriptor, GattIncludedService,
    GattService, HandleRange, HANDLE_MAX, HANDLE_MIN,
};

use crate::peer::registry::PeerNode;
use crate::pool::NodeId;
use crate::uuid::Uuid;

/// Round status reported on success
pub const STATUS_SUCCESS: u16 = 0;

/// Identifies the discovery session a request belongs to.
///
/// The discovery service hands it back with every event. Once the session has
/// finished, or its peer has been deleted, the token no longer matches and
/// events carrying it are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    conn_handle: u16,
    peer: NodeId<PeerNode>,
    session: u32,
}

impl SessionToken {
    pub(crate) fn new(conn_handle: u16, peer: NodeId<PeerNode>, session: u32) -> Self {
        Self {
            conn_handle,
            peer,
            session,
        }
    }

    /// Connection the request must be issued on
    pub fn conn_handle(&self) -> u16 {
        self.conn_handle
    }

    pub fn session_id(&self) -> u32 {
        self.session
    }

    pub(crate) fn peer(&self) -> NodeId<PeerNode> {
        self.peer
    }
}

/// Output of the discovery service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Service(GattService),
    IncludedService(GattIncludedService),
    Characteristic(GattCharacteristic),
    Descriptor(GattDescriptor),
    /// End of the current round; [`STATUS_SUCCESS`] or a protocol status
    Complete(u16),
}

/// The asynchronous procedures discovery is built from.
///
/// Each method only starts a round and must not call back into the cache
/// before returning. An `Err` carries the status that prevented the request
/// from being issued; no events may follow it.
pub trait GattDiscovery {
    /// Discover all primary services
    fn discover_services(&mut self, token: SessionToken) -> Result<(), u16>;

    /// Discover the primary services with the given UUID
    fn discover_services_by_uuid(&mut self, uuid: &Uuid, token: SessionToken)
        -> Result<(), u16>;

    /// Find the include declarations of a service
    fn discover_included_services(
        &mut self,
        range: HandleRange,
        token: SessionToken,
    ) -> Result<(), u16>;

    /// Discover all characteristics of a service
    fn discover_characteristics(&mut self, range: HandleRange, token: SessionToken)
        -> Result<(), u16>;

    /// Discover all descriptors of a characteristic
    fn discover_descriptors(&mut self, range: HandleRange, token: SessionToken)
        -> Result<(), u16>;
}

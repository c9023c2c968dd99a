//! bluepeer - A cache of remote GATT attribute tables for BLE hosts
//!
//! For every connection the host registers, the cache keeps the peer's
//! services, included services, characteristics and descriptors as found by
//! discovery. All records live in fixed-size pools chosen at construction, so
//! a long-running host never grows its memory use while peers come and go.
//!
//! Discovery itself is delegated to a [`GattDiscovery`] implementation that
//! performs the ATT procedures and reports results back through
//! [`PeerCache::handle_event`]. The cache sequences the rounds and reports the
//! outcome of each session once, through the callback it was started with.

pub mod addr;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod peer;
pub mod pool;
pub mod uuid;

// Re-export common types for convenience
pub use addr::BdAddr;
pub use cache::{PeerCache, SharedPeerCache};
pub use config::{FailurePolicy, PeerCacheConfig, PoolCapacities};
pub use discovery::{
    CharacteristicProperty, DiscoveryCallback, DiscoveryEvent, DiscoveryState, GattCharacteristic,
    GattDescriptor, GattDiscovery, GattIncludedService, GattService, HandleRange, SessionToken,
    STATUS_SUCCESS,
};
pub use error::{PeerError, PeerResult};
pub use peer::{CharacteristicRef, PeerRef, PoolUsage, ServiceRef};
pub use pool::{NodeKind, PoolStats};
pub use uuid::Uuid;

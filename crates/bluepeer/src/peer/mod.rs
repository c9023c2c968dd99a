//! Peer records and their attribute trees

pub mod lookup;
pub(crate) mod registry;
pub(crate) mod tree;

pub use lookup::{CharacteristicRef, PeerRef, ServiceRef};
pub use registry::PoolUsage;
pub use tree::Released;

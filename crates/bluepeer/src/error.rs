//! Error types for the bluepeer library
//!
//! Registry operations report these synchronously. A discovery session reports
//! its outcome once, through the completion callback.

use crate::pool::NodeKind;
use thiserror::Error;

/// Errors returned by the peer cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("No matching peer or attribute")]
    NotFound,

    #[error("Connection 0x{0:04X} already has a peer record")]
    Duplicate(u16),

    #[error("Out of {0} records")]
    OutOfMemory(NodeKind),

    #[error("Discovery failed with status 0x{0:04X}")]
    Protocol(u16),

    #[error("Discovery already in progress on connection 0x{0:04X}")]
    Busy(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for peer cache operations
pub type PeerResult<T> = Result<T, PeerError>;

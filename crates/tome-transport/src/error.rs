use crate::PeerId;

/// Errors returned by the Tome transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TomeTransportError {
    #[error("peer {0} is not in the room")]
    PeerNotFound(PeerId),

    #[error("peer {0} is already in the room")]
    DuplicatePeer(PeerId),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("room has been left")]
    Shutdown,

    #[error("invalid configuration: {0}")]
    Config(String),
}

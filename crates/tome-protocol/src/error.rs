use tome_transport::PeerId;

/// Protocol-level errors for Tome.
///
/// Wraps transport errors and adds session-specific variants
/// (request abandonment, missing hub, serialization).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TomeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("request to {peer} abandoned: peer left")]
    RequestAbandoned { peer: PeerId },

    #[error("no hub known yet")]
    NoHub,

    #[error("session closed")]
    SessionClosed,
}

impl From<tome_transport::TomeTransportError> for TomeError {
    fn from(e: tome_transport::TomeTransportError) -> Self {
        TomeError::Transport(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for TomeError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        TomeError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for TomeError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        TomeError::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for TomeError {
    fn from(e: serde_json::Error) -> Self {
        TomeError::Serialization(e.to_string())
    }
}

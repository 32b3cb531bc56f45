use crate::{PeerId, RoomConfig, TomeTransportError};

/// Something that happened in a room, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A peer became reachable.
    PeerJoin(PeerId),
    /// A peer left (gracefully or not).
    PeerLeave(PeerId),
    /// Opaque payload from a peer.
    Message { from: PeerId, data: Vec<u8> },
}

/// A joined room: the transport handle one session owns exclusively.
///
/// In production this is a browser/WebRTC mesh or similar.
/// In tests it is a [`MemoryRoom`](crate::MemoryRoom).
#[async_trait::async_trait]
pub trait Room: Send + Sync {
    /// Our own identifier, assigned by the transport.
    fn self_id(&self) -> &PeerId;

    /// Send `data` to `target`, or to every other peer when `target` is `None`.
    async fn send(&self, data: &[u8], target: Option<&PeerId>) -> Result<(), TomeTransportError>;

    /// Wait for the next event. Returns `Shutdown` once the room is gone.
    async fn next_event(&mut self) -> Result<RoomEvent, TomeTransportError>;

    /// Leave the room. Other peers observe a `PeerLeave`.
    async fn leave(&mut self) -> Result<(), TomeTransportError>;
}

/// Entry point into a transport: turns room coordinates into a [`Room`].
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Room: Room + 'static;

    async fn join_room(&self, config: RoomConfig) -> Result<Self::Room, TomeTransportError>;
}

use crate::envelope::Envelope;
use crate::types::PeerId;

/// Intention produced by the pure [`SessionState`](super::state::SessionState).
///
/// Every `handle_*` method returns a `Vec<SessionEffect>`; the session loop
/// executes them against the room afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Transmit to a peer directly connected through the room.
    ///
    /// `target` is the next hop: the final recipient for the hub, the hub
    /// itself for a spoke.
    SendTo { target: PeerId, envelope: Envelope },
}

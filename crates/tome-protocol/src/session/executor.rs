//! Effect executor: the only place that touches the room.

use tome_transport::Room;

use super::effect::SessionEffect;

/// Execute effects in order. Send failures are logged and otherwise
/// ignored: a peer that vanished mid-send is reported by the room as a
/// departure soon after.
pub(super) async fn execute_effects<R: Room>(effects: Vec<SessionEffect>, room: &R) {
    for effect in effects {
        match effect {
            SessionEffect::SendTo { target, envelope } => {
                let bytes = match envelope.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(msg_type = %envelope.msg_type, "serialize envelope failed: {e}");
                        continue;
                    }
                };
                tracing::debug!(
                    %target,
                    msg_type = %envelope.msg_type,
                    dst = %envelope.dst,
                    bytes = bytes.len(),
                    "tx"
                );
                if let Err(e) = room.send(&bytes, Some(&target)).await {
                    tracing::warn!(%target, msg_type = %envelope.msg_type, "send failed: {e}");
                }
            }
        }
    }
}

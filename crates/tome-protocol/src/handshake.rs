//! Admission hash chain.
//!
//! The hub challenges a newcomer `p` with `hash(p)` and admits it only if
//! the reply is `hash(hash(p))`. Both sides can compute the chain from the
//! transport id alone, so this filters out peers that do not speak the
//! protocol. It is not an authentication mechanism.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::types::{PeerId, RequestId};

/// `base64(SHA-1(s))`, standard alphabet with padding.
pub fn hash(s: &str) -> String {
    STANDARD.encode(Sha1::digest(s.as_bytes()))
}

/// What the hub sends in `__hello__`.
pub fn challenge(peer: &PeerId) -> String {
    hash(peer.as_str())
}

/// What the hub expects back in `__world__`.
pub fn answer(peer: &PeerId) -> String {
    hash(&challenge(peer))
}

/// Fresh candidate request id. Callers still check for collisions.
pub fn new_request_id() -> RequestId {
    hash(&uuid::Uuid::new_v4().to_string())
}

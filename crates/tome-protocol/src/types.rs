use std::fmt;

use serde::{Deserialize, Serialize};

pub use tome_transport::PeerId;

/// Correlation id carried in `req_id` / `res_id`.
pub type RequestId = String;

/// Hub sends this to a newcomer, carrying `hash(newcomer id)`.
pub const HELLO: &str = "__hello__";
/// Spoke answers the challenge with `hash(hash(own id))`.
pub const WORLD: &str = "__world__";
/// A spoke was admitted (payload: its id).
pub const CLIENT_CONNECTED: &str = "client-connected";
/// A spoke left (payload: its id).
pub const CLIENT_DISCONNECTED: &str = "client-disconnected";
/// Spoke-local: the hub accepted us (payload: hub id).
pub const SERVER_CONNECTED: &str = "server-connected";
/// Spoke-local: the hub left (payload: hub id).
pub const SERVER_DISCONNECTED: &str = "server-disconnected";

/// Which side of the star a session plays. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Root of the star: admits spokes and relays their traffic.
    Hub,
    /// Leaf: talks to everyone through the hub.
    Spoke,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Hub => write!(f, "hub"),
            Role::Spoke => write!(f, "spoke"),
        }
    }
}

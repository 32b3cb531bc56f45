//! Tome transport boundary.
//!
//! The overlay protocol runs on top of a peer-to-peer *room*: a set of peers
//! that see each other join and leave and can exchange opaque, addressed
//! payloads. This crate defines that boundary ([`Room`], [`Connector`]) and
//! ships [`MemoryNetwork`], an in-process mesh used by tests, demos and
//! single-process simulations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tome_transport::{Connector, MemoryNetwork, Room, RoomConfig, RoomEvent};
//!
//! # async fn example() -> Result<(), tome_transport::TomeTransportError> {
//! let network = MemoryNetwork::new();
//! let config = RoomConfig::new("tome 0.1.0", "ROOMID", "PASSWD");
//!
//! let a = network.join_room(config.clone()).await?;
//! let mut b = network.join_room(config).await?;
//!
//! // b learns about a, then receives a's broadcast
//! a.send(b"hello", None).await?;
//! while let Ok(event) = b.next_event().await {
//!     if let RoomEvent::Message { from, data } = event {
//!         println!("{from}: {} bytes", data.len());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod memory;
mod room;

pub use config::{RoomConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::TomeTransportError;
pub use memory::{MemoryNetwork, MemoryRoom};
pub use room::{Connector, Room, RoomEvent};

use std::fmt;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of identifiers produced by [`PeerId::random`].
pub const PEER_ID_LEN: usize = 20;

/// Transport-assigned peer identity.
///
/// Opaque to the protocol layer: it is only compared, hashed and echoed
/// back in envelopes. Serialized as a bare string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draw a fresh random alphanumeric identifier.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let id: String = (0..PEER_ID_LEN)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        };
        write!(f, "PeerId({short})")
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

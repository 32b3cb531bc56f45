//! Tome protocol layer.
//!
//! A star overlay on top of a `tome-transport` room: one hub admits spokes
//! through a hash-chain challenge, relays their envelopes to each other,
//! correlates requests with responses, and dispatches payloads to typed
//! listeners.
//!
//! Wire format: MessagePack maps. Payloads: JSON values.

pub mod correlator;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod membership;
pub mod secret;
pub mod session;
pub mod types;
pub mod version;

pub use correlator::{Completion, PendingReply, RequestTable, Settled};
pub use dispatch::{Context, DispatchRegistry, Flow, Listener};
pub use envelope::{Addressing, Envelope};
pub use error::TomeError;
pub use membership::{Audience, Membership};
pub use secret::Secret;
pub use session::{Session, SessionBuilder, SessionConfig, SessionEffect, SessionState};
pub use types::{PeerId, RequestId, Role};
pub use version::Version;

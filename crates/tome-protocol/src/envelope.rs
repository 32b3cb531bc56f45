use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TomeError;
use crate::types::{PeerId, RequestId};

/// Protocol-level envelope: the unit exchanged over the room transport.
///
/// Serialized as a MessagePack *map* so the optional correlation ids can be
/// omitted on the wire. The payload is opaque to routing: the hub relays it
/// without looking inside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Original sender. The hub rewrites it to the transport sender when relaying.
    pub src: PeerId,
    /// Final recipient. Equal to the local id for loopback delivery.
    pub dst: PeerId,
    /// Listener key.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Present when the sender expects a reply carrying this id as `res_id`.
    #[serde(default, rename = "reqId", skip_serializing_if = "Option::is_none")]
    pub req_id: Option<RequestId>,
    /// Present when this envelope answers an earlier request.
    #[serde(default, rename = "resId", skip_serializing_if = "Option::is_none")]
    pub res_id: Option<RequestId>,
}

impl Envelope {
    /// Create a plain envelope with no correlation ids.
    pub fn new(src: PeerId, dst: PeerId, msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            src,
            dst,
            msg_type: msg_type.into(),
            data,
            req_id: None,
            res_id: None,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TomeError> {
        rmp_serde::to_vec_named(self).map_err(Into::into)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TomeError> {
        rmp_serde::from_slice(data).map_err(Into::into)
    }

    pub fn is_request(&self) -> bool {
        self.req_id.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.res_id.is_some()
    }
}

/// Optional overrides for an outgoing envelope.
///
/// Unset `src` / `dst` default to the local id, which makes the send a
/// loopback delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Addressing {
    pub src: Option<PeerId>,
    pub dst: Option<PeerId>,
    pub req_id: Option<RequestId>,
    pub res_id: Option<RequestId>,
}

impl Addressing {
    /// Address a specific peer.
    pub fn to(peer: PeerId) -> Self {
        Self {
            dst: Some(peer),
            ..Self::default()
        }
    }

    /// Mark the envelope as the answer to `req_id`.
    pub fn in_reply_to(mut self, req_id: Option<RequestId>) -> Self {
        self.res_id = req_id;
        self
    }

    /// Claim a source other than the local id.
    pub fn from(mut self, src: PeerId) -> Self {
        self.src = Some(src);
        self
    }

    /// Build the envelope, filling unset endpoints with `local`.
    pub(crate) fn seal(self, local: &PeerId, msg_type: &str, data: Value) -> Envelope {
        Envelope {
            src: self.src.unwrap_or_else(|| local.clone()),
            dst: self.dst.unwrap_or_else(|| local.clone()),
            msg_type: msg_type.to_string(),
            data,
            req_id: self.req_id,
            res_id: self.res_id,
        }
    }
}

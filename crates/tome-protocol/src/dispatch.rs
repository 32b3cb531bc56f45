//! Per-type listener sets with one-shot and persistent listeners.
//!
//! Listeners are plain synchronous callbacks. They never touch the session
//! directly: replies and new subscriptions are queued on the [`Context`] and
//! applied by the session once the envelope has reached every listener.
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::correlator::{PendingReply, ReplySender};
use crate::envelope::{Addressing, Envelope};
use crate::types::{PeerId, RequestId};

/// What a listener wants after seeing a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep me registered.
    Continue,
    /// Remove me; I have consumed what I was waiting for.
    Done,
}

/// A registered callback.
pub type Listener = Box<dyn FnMut(&Value, &mut Context) -> Flow + Send>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: FnMut(&Value, &mut Context) -> Flow + Send + 'static,
{
    Box::new(f)
}

/// Wrap a closure taking a decoded payload.
///
/// Payloads that fail to decode as `T` are skipped and the listener stays
/// registered.
pub fn typed<T, F>(mut f: F) -> Listener
where
    T: DeserializeOwned,
    F: FnMut(T, &mut Context) -> Flow + Send + 'static,
{
    Box::new(move |data: &Value, ctx: &mut Context| {
        match serde_json::from_value::<T>(data.clone()) {
            Ok(value) => f(value, ctx),
            Err(e) => {
                tracing::debug!(msg_type = %ctx.msg_type(), "listener skipped undecodable payload: {e}");
                Flow::Continue
            }
        }
    })
}

/// Deferred work produced by listeners.
pub(crate) enum ContextAction {
    Send {
        msg_type: String,
        data: Value,
        addressing: Addressing,
        reply: Option<ReplySender>,
    },
    Subscribe {
        msg_type: String,
        listener: Listener,
    },
}

/// What a listener sees besides the payload.
///
/// `respond` and `request` are pre-bound to the envelope's source and echo
/// its request id as the response id.
pub struct Context {
    src: PeerId,
    dst: PeerId,
    msg_type: String,
    req_id: Option<RequestId>,
    pub(crate) actions: Vec<ContextAction>,
}

impl Context {
    pub(crate) fn new(envelope: &Envelope) -> Self {
        Self {
            src: envelope.src.clone(),
            dst: envelope.dst.clone(),
            msg_type: envelope.msg_type.clone(),
            req_id: envelope.req_id.clone(),
            actions: Vec::new(),
        }
    }

    pub fn src(&self) -> &PeerId {
        &self.src
    }

    pub fn dst(&self) -> &PeerId {
        &self.dst
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Id the sender expects to see echoed, if it asked for a reply.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.req_id.as_ref()
    }

    /// Reply with the same message type.
    ///
    /// The reply is itself delivered to listeners of that type on the
    /// requesting side before it settles the request. A listener that
    /// answers its own type should only answer when [`Self::request_id`]
    /// is set.
    pub fn respond(&mut self, data: Value) {
        let msg_type = self.msg_type.clone();
        self.respond_as(&msg_type, data);
    }

    /// Reply with an explicit message type.
    pub fn respond_as(&mut self, msg_type: &str, data: Value) {
        self.actions.push(ContextAction::Send {
            msg_type: msg_type.to_string(),
            data,
            addressing: self.reply_addressing(),
            reply: None,
        });
    }

    /// Reply and expect a reply in turn.
    pub fn request(&mut self, data: Value) -> PendingReply {
        let msg_type = self.msg_type.clone();
        self.request_as(&msg_type, data)
    }

    pub fn request_as(&mut self, msg_type: &str, data: Value) -> PendingReply {
        let (tx, reply) = PendingReply::channel();
        self.actions.push(ContextAction::Send {
            msg_type: msg_type.to_string(),
            data,
            addressing: self.reply_addressing(),
            reply: Some(tx),
        });
        reply
    }

    /// Register another listener once this delivery completes.
    pub fn subscribe<F>(&mut self, msg_type: &str, f: F)
    where
        F: FnMut(&Value, &mut Context) -> Flow + Send + 'static,
    {
        self.actions.push(ContextAction::Subscribe {
            msg_type: msg_type.to_string(),
            listener: Box::new(f),
        });
    }

    fn reply_addressing(&self) -> Addressing {
        Addressing::to(self.src.clone()).in_reply_to(self.req_id.clone())
    }
}

/// Listener sets keyed by message type.
#[derive(Default)]
pub struct DispatchRegistry {
    listeners: HashMap<String, Vec<Listener>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. The same callback logic may be registered any number
    /// of times; each registration is independent.
    pub fn subscribe(&mut self, msg_type: impl Into<String>, listener: Listener) {
        self.listeners.entry(msg_type.into()).or_default().push(listener);
    }

    /// Deliver `data` to every listener registered for `msg_type`, in
    /// registration order. Listeners returning [`Flow::Done`] are removed.
    ///
    /// Returns how many listeners were invoked.
    pub fn dispatch(&mut self, msg_type: &str, data: &Value, ctx: &mut Context) -> usize {
        let Some(mut snapshot) = self.listeners.remove(msg_type) else {
            return 0;
        };
        let invoked = snapshot.len();
        snapshot.retain_mut(|listener| listener(data, ctx) == Flow::Continue);
        if !snapshot.is_empty() {
            self.listeners.insert(msg_type.to_string(), snapshot);
        }
        invoked
    }

    pub fn listener_count(&self, msg_type: &str) -> usize {
        self.listeners.get(msg_type).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

//! Session state: pure protocol logic, no async, no network.
//!
//! Every `handle_*` method consumes one input (a room event or an
//! application command), mutates the membership set, the listener registry
//! and the request table, and returns the envelopes to put on the wire.
//! Envelopes addressed to the local id never reach the wire: they go through
//! a loopback queue that is drained before the handler returns, so a single
//! input is fully processed in one turn.
use std::collections::VecDeque;

use serde_json::Value;

use crate::correlator::{Completion, ReplySender, RequestTable, Settled};
use crate::dispatch::{Context, ContextAction, DispatchRegistry, Listener};
use crate::envelope::{Addressing, Envelope};
use crate::error::TomeError;
use crate::handshake;
use crate::membership::{Audience, Membership};
use crate::types::{self, PeerId, Role};

use super::effect::SessionEffect;

pub struct SessionState {
    membership: Membership,
    registry: DispatchRegistry,
    requests: RequestTable,
    loopback: VecDeque<Envelope>,
}

impl SessionState {
    pub fn new(role: Role, local_id: PeerId) -> Self {
        Self {
            membership: Membership::new(role, local_id),
            registry: DispatchRegistry::new(),
            requests: RequestTable::new(),
            loopback: VecDeque::new(),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        self.membership.local_id()
    }

    pub fn role(&self) -> Role {
        self.membership.role()
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    pub fn subscribe(&mut self, msg_type: impl Into<String>, listener: Listener) {
        self.registry.subscribe(msg_type, listener);
    }

    // ── Room events ─────────────────────────────────────────────────────

    /// A peer appeared in the room. The hub challenges it; a spoke waits to
    /// be challenged itself.
    pub fn handle_peer_join(&mut self, peer: PeerId) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        match self.role() {
            Role::Hub => {
                let expected = handshake::answer(&peer);
                let req_id = self
                    .requests
                    .issue(peer.clone(), Completion::Admission { expected });
                let mut hello = Envelope::new(
                    self.local_id().clone(),
                    peer.clone(),
                    types::HELLO,
                    Value::String(handshake::challenge(&peer)),
                );
                hello.req_id = Some(req_id);
                tracing::debug!(%peer, "challenging newcomer");
                self.push(Some(peer), hello, &mut effects);
            }
            Role::Spoke => {
                tracing::debug!(%peer, "peer joined room");
            }
        }
        effects
    }

    /// A peer left the room.
    ///
    /// Requests addressed to it are rejected before any departure is
    /// announced, so no listener observing the announcement can still see
    /// one of them settle afterwards.
    pub fn handle_peer_leave(&mut self, peer: PeerId) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        let abandoned = self.requests.reject_peer(&peer);
        if abandoned > 0 {
            tracing::debug!(%peer, abandoned, "rejected requests to departed peer");
        }

        match self.role() {
            Role::Hub => {
                if self.membership.remove(&peer) {
                    tracing::info!(%peer, "spoke left");
                    self.announce(types::CLIENT_DISCONNECTED, &peer);
                    let remaining: Vec<PeerId> = self.membership.members().cloned().collect();
                    for member in remaining {
                        let envelope = self.direct(&member, types::CLIENT_DISCONNECTED, &peer);
                        self.push(Some(member), envelope, &mut effects);
                    }
                }
            }
            Role::Spoke => {
                if self.membership.remove(&peer) {
                    tracing::debug!(%peer, "fellow spoke left");
                    self.announce(types::CLIENT_DISCONNECTED, &peer);
                } else if self.membership.is_hub_peer(&peer) {
                    self.membership.clear_hub();
                    tracing::info!(hub = %peer, "hub left");
                    self.announce(types::SERVER_DISCONNECTED, &peer);
                }
            }
        }

        self.drain_loopback(&mut effects);
        effects
    }

    /// Raw bytes from `from`.
    ///
    /// The hub forwards envelopes addressed to someone else, rewriting the
    /// source to the peer that actually sent them. Everything else is
    /// delivered locally.
    pub fn handle_incoming(&mut self, from: PeerId, data: &[u8]) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        let mut envelope = match Envelope::from_bytes(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%from, "dropping undecodable frame: {e}");
                return effects;
            }
        };
        tracing::debug!(
            %from,
            msg_type = %envelope.msg_type,
            src = %envelope.src,
            dst = %envelope.dst,
            "rx"
        );

        if self.membership.is_hub() && envelope.dst != *self.local_id() {
            envelope.src = from;
            let target = envelope.dst.clone();
            tracing::debug!(src = %envelope.src, dst = %target, msg_type = %envelope.msg_type, "relaying");
            effects.push(SessionEffect::SendTo { target, envelope });
            return effects;
        }

        self.loopback.push_back(envelope);
        self.drain_loopback(&mut effects);
        effects
    }

    // ── Application commands ────────────────────────────────────────────

    /// Fire-and-forget send.
    pub fn handle_send(
        &mut self,
        msg_type: &str,
        data: Value,
        addressing: Addressing,
    ) -> Result<Vec<SessionEffect>, TomeError> {
        let mut effects = Vec::new();
        let envelope = addressing.seal(self.local_id(), msg_type, data);
        self.route(envelope, &mut effects)?;
        self.drain_loopback(&mut effects);
        Ok(effects)
    }

    /// Send and register a pending request. Failures are reported through
    /// `reply`.
    pub fn handle_request(
        &mut self,
        msg_type: &str,
        data: Value,
        addressing: Addressing,
        reply: ReplySender,
    ) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if let Err(e) = self.issue(msg_type, data, addressing, reply, &mut effects) {
            tracing::debug!(msg_type, "request not sent: {e}");
        }
        self.drain_loopback(&mut effects);
        effects
    }

    /// Send to every member selected by `audience`.
    pub fn handle_broadcast(
        &mut self,
        msg_type: &str,
        data: Value,
        audience: &Audience,
    ) -> Result<Vec<SessionEffect>, TomeError> {
        let mut effects = Vec::new();
        for target in self.membership.select(audience) {
            let envelope = Addressing::to(target).seal(self.local_id(), msg_type, data.clone());
            self.route(envelope, &mut effects)?;
        }
        self.drain_loopback(&mut effects);
        Ok(effects)
    }

    /// Reject everything still pending. Returns how many requests that was.
    pub fn shutdown(&mut self) -> usize {
        self.loopback.clear();
        self.requests.reject_all()
    }

    // ── Delivery ────────────────────────────────────────────────────────

    fn drain_loopback(&mut self, effects: &mut Vec<SessionEffect>) {
        while let Some(envelope) = self.loopback.pop_front() {
            self.deliver(envelope, effects);
        }
    }

    /// Internal handlers, then listeners, then the matching pending request.
    fn deliver(&mut self, envelope: Envelope, effects: &mut Vec<SessionEffect>) {
        if self.intercept(&envelope, effects) {
            let mut ctx = Context::new(&envelope);
            self.registry
                .dispatch(&envelope.msg_type, &envelope.data, &mut ctx);
            self.apply(ctx.actions, effects);
        }

        let Some(res_id) = envelope.res_id.as_deref() else {
            return;
        };
        match self.requests.resolve(res_id, &envelope.data) {
            Some(Settled::Admission {
                peer,
                accepted: true,
            }) => self.admit(peer, effects),
            Some(Settled::Admission {
                peer,
                accepted: false,
            }) => {
                tracing::debug!(%peer, "admission answer did not match");
            }
            Some(Settled::Caller) | None => {}
        }
    }

    /// Spoke-side protocol handlers. Returns whether application listeners
    /// should still see the envelope.
    fn intercept(&mut self, envelope: &Envelope, effects: &mut Vec<SessionEffect>) -> bool {
        if self.membership.is_hub() {
            return true;
        }
        match envelope.msg_type.as_str() {
            types::HELLO => {
                let expected = handshake::challenge(self.local_id());
                if self.membership.hub_id().is_none()
                    && envelope.data.as_str() == Some(expected.as_str())
                {
                    let hub = envelope.src.clone();
                    tracing::info!(%hub, "answering hub challenge");
                    self.membership.set_hub(hub.clone());
                    let world = Addressing::to(hub.clone())
                        .in_reply_to(envelope.req_id.clone())
                        .seal(
                            self.local_id(),
                            types::WORLD,
                            Value::String(handshake::answer(self.local_id())),
                        );
                    self.push(Some(hub.clone()), world, effects);
                    self.announce(types::SERVER_CONNECTED, &hub);
                }
                true
            }
            types::CLIENT_CONNECTED => {
                if let Some(peer) = peer_of(&envelope.data) {
                    if peer != *self.local_id() {
                        self.membership.add(peer);
                    }
                }
                true
            }
            types::CLIENT_DISCONNECTED if envelope.src != *self.local_id() => {
                // the room's own leave event may already have removed it
                let Some(peer) = peer_of(&envelope.data) else {
                    return true;
                };
                let abandoned = self.requests.reject_peer(&peer);
                if abandoned > 0 {
                    tracing::debug!(%peer, abandoned, "rejected requests to departed peer");
                }
                self.membership.remove(&peer)
            }
            _ => true,
        }
    }

    /// Fan out a freshly admitted spoke, then record it.
    fn admit(&mut self, peer: PeerId, effects: &mut Vec<SessionEffect>) {
        tracing::info!(%peer, "spoke admitted");
        let existing: Vec<PeerId> = self
            .membership
            .members()
            .filter(|member| **member != peer)
            .cloned()
            .collect();
        for member in &existing {
            let envelope = self.direct(member, types::CLIENT_CONNECTED, &peer);
            self.push(Some(member.clone()), envelope, effects);
        }
        for member in &existing {
            let envelope = self.direct(&peer, types::CLIENT_CONNECTED, member);
            self.push(Some(peer.clone()), envelope, effects);
        }
        self.membership.add(peer.clone());
        self.announce(types::CLIENT_CONNECTED, &peer);
    }

    fn apply(&mut self, actions: Vec<ContextAction>, effects: &mut Vec<SessionEffect>) {
        for action in actions {
            match action {
                ContextAction::Send {
                    msg_type,
                    data,
                    addressing,
                    reply: None,
                } => {
                    let envelope = addressing.seal(self.local_id(), &msg_type, data);
                    if let Err(e) = self.route(envelope, effects) {
                        tracing::warn!(%msg_type, "listener reply not sent: {e}");
                    }
                }
                ContextAction::Send {
                    msg_type,
                    data,
                    addressing,
                    reply: Some(reply),
                } => {
                    // failures already went to the reply slot
                    let _ = self.issue(&msg_type, data, addressing, reply, effects);
                }
                ContextAction::Subscribe { msg_type, listener } => {
                    self.registry.subscribe(msg_type, listener);
                }
            }
        }
    }

    // ── Routing ─────────────────────────────────────────────────────────

    fn issue(
        &mut self,
        msg_type: &str,
        data: Value,
        addressing: Addressing,
        reply: ReplySender,
        effects: &mut Vec<SessionEffect>,
    ) -> Result<(), TomeError> {
        let mut envelope = addressing.seal(self.local_id(), msg_type, data);
        let hop = match self.next_hop(&envelope.dst) {
            Ok(hop) => hop,
            Err(e) => {
                let _ = reply.send(Err(e.clone()));
                return Err(e);
            }
        };
        let req_id = self
            .requests
            .issue(envelope.dst.clone(), Completion::Caller(reply));
        envelope.req_id = Some(req_id);
        self.push(hop, envelope, effects);
        Ok(())
    }

    fn route(&mut self, envelope: Envelope, effects: &mut Vec<SessionEffect>) -> Result<(), TomeError> {
        let hop = self.next_hop(&envelope.dst)?;
        self.push(hop, envelope, effects);
        Ok(())
    }

    /// `None` means loopback. The hub reaches every peer directly; a spoke
    /// goes through its hub.
    fn next_hop(&self, dst: &PeerId) -> Result<Option<PeerId>, TomeError> {
        if dst == self.local_id() {
            return Ok(None);
        }
        match self.role() {
            Role::Hub => Ok(Some(dst.clone())),
            Role::Spoke => self
                .membership
                .hub_id()
                .cloned()
                .map(Some)
                .ok_or(TomeError::NoHub),
        }
    }

    fn push(&mut self, hop: Option<PeerId>, envelope: Envelope, effects: &mut Vec<SessionEffect>) {
        match hop {
            None => self.loopback.push_back(envelope),
            Some(target) => effects.push(SessionEffect::SendTo { target, envelope }),
        }
    }

    /// Local membership announcement.
    fn announce(&mut self, msg_type: &str, peer: &PeerId) {
        let local = self.local_id().clone();
        self.loopback
            .push_back(Envelope::new(local.clone(), local, msg_type, peer_value(peer)));
    }

    fn direct(&self, to: &PeerId, msg_type: &str, about: &PeerId) -> Envelope {
        Envelope::new(self.local_id().clone(), to.clone(), msg_type, peer_value(about))
    }
}

fn peer_value(peer: &PeerId) -> Value {
    Value::String(peer.to_string())
}

fn peer_of(data: &Value) -> Option<PeerId> {
    data.as_str().map(PeerId::from)
}

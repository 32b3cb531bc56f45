//! Request/response correlation.
//!
//! Every outstanding request is keyed by a fresh id and remembers which peer
//! it was sent to. An entry completes at most once: by a matching response,
//! by the peer leaving, or by the session shutting down. There is no timeout;
//! a request to a peer that never answers stays pending until one of those
//! happens.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TomeError;
use crate::handshake::new_request_id;
use crate::types::{PeerId, RequestId};

/// Sending half of a reply slot.
pub type ReplySender = oneshot::Sender<Result<Value, TomeError>>;

/// A reply that has not arrived yet.
///
/// Resolves to the response payload, or to the error that abandoned the
/// request. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Value, TomeError>>,
}

impl PendingReply {
    pub fn channel() -> (ReplySender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for PendingReply {
    type Output = Result<Value, TomeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(TomeError::SessionClosed)))
    }
}

/// What happens when an entry settles.
#[derive(Debug)]
pub enum Completion {
    /// Hand the payload (or the error) to an awaiting caller.
    Caller(ReplySender),
    /// Admission challenge: the payload must equal `expected`.
    Admission { expected: String },
}

/// Outcome of [`RequestTable::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// A caller was handed the payload.
    Caller,
    /// An admission challenge was answered.
    Admission { peer: PeerId, accepted: bool },
}

#[derive(Debug)]
struct PendingRequest {
    peer: PeerId,
    completion: Completion,
}

/// Outstanding requests keyed by request id.
#[derive(Debug, Default)]
pub struct RequestTable {
    pending: HashMap<RequestId, PendingRequest>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request to `peer` under a fresh id.
    pub fn issue(&mut self, peer: PeerId, completion: Completion) -> RequestId {
        self.issue_with(peer, completion, new_request_id)
    }

    /// Like [`issue`](Self::issue) with a caller-supplied id source.
    ///
    /// Ids already pending are skipped, so the source is drawn from until it
    /// yields an unused one.
    pub fn issue_with(
        &mut self,
        peer: PeerId,
        completion: Completion,
        mut next_id: impl FnMut() -> RequestId,
    ) -> RequestId {
        let id = loop {
            let candidate = next_id();
            if !self.pending.contains_key(&candidate) {
                break candidate;
            }
            tracing::trace!("request id collision, drawing again");
        };
        self.pending
            .insert(id.clone(), PendingRequest { peer, completion });
        id
    }

    /// Settle the entry for `id` with `payload`.
    ///
    /// Returns `None` when nothing is pending under `id`: an unknown or
    /// already settled id is ignored.
    pub fn resolve(&mut self, id: &str, payload: &Value) -> Option<Settled> {
        let entry = self.pending.remove(id)?;
        Some(match entry.completion {
            Completion::Caller(tx) => {
                let _ = tx.send(Ok(payload.clone()));
                Settled::Caller
            }
            Completion::Admission { expected } => Settled::Admission {
                peer: entry.peer,
                accepted: payload.as_str() == Some(expected.as_str()),
            },
        })
    }

    /// Abandon every request sent to `peer`. Returns how many were dropped.
    pub fn reject_peer(&mut self, peer: &PeerId) -> usize {
        let ids: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.peer == *peer)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(entry) = self.pending.remove(id) {
                fail(entry.completion, TomeError::RequestAbandoned { peer: peer.clone() });
            }
        }
        ids.len()
    }

    /// Abandon everything with [`TomeError::SessionClosed`].
    pub fn reject_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            fail(entry.completion, TomeError::SessionClosed);
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Peer a pending request was sent to.
    pub fn peer_of(&self, id: &str) -> Option<&PeerId> {
        self.pending.get(id).map(|entry| &entry.peer)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn fail(completion: Completion, error: TomeError) {
    if let Completion::Caller(tx) = completion {
        let _ = tx.send(Err(error));
    }
}

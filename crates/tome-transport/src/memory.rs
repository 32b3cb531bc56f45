//! In-process mesh transport.
//!
//! Every room is a map of peer → inbox. Joining announces the newcomer to
//! every member and every member to the newcomer, so each peer observes the
//! same join/leave stream a real mesh would give it. Inboxes are unbounded:
//! sends never wait on a slow reader, which keeps two session loops that
//! message each other from ever deadlocking.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::{Connector, PeerId, Room, RoomConfig, RoomEvent, TomeTransportError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RoomKey {
    app_id: String,
    room_id: String,
    password: String,
}

impl From<&RoomConfig> for RoomKey {
    fn from(config: &RoomConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            room_id: config.room_id.clone(),
            password: config.password.clone(),
        }
    }
}

type Inbox = mpsc::UnboundedSender<RoomEvent>;

#[derive(Default)]
struct Registry {
    rooms: HashMap<RoomKey, BTreeMap<PeerId, Inbox>>,
}

/// Shared handle to a set of in-process rooms. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join with a caller-chosen identifier instead of a random one.
    pub fn join_room_as(
        &self,
        config: RoomConfig,
        id: PeerId,
    ) -> Result<MemoryRoom, TomeTransportError> {
        config.validate()?;
        let key = RoomKey::from(&config);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut registry = self.lock();
            let room = registry.rooms.entry(key.clone()).or_default();
            if room.contains_key(&id) {
                return Err(TomeTransportError::DuplicatePeer(id));
            }
            for (peer, inbox) in room.iter() {
                let _ = inbox.send(RoomEvent::PeerJoin(id.clone()));
                let _ = tx.send(RoomEvent::PeerJoin(peer.clone()));
            }
            room.insert(id.clone(), tx);
        }

        tracing::debug!(peer = %id, room = %config.room_id, "memory: joined room");

        Ok(MemoryRoom {
            id,
            key,
            max_message_size: config.max_message_size,
            network: self.clone(),
            rx,
            joined: true,
        })
    }

    /// Peers currently in the room described by `config`, in id order.
    pub fn peers(&self, config: &RoomConfig) -> Vec<PeerId> {
        self.lock()
            .rooms
            .get(&RoomKey::from(config))
            .map(|room| room.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detach(&self, key: &RoomKey, id: &PeerId) {
        let mut registry = self.lock();
        let Some(room) = registry.rooms.get_mut(key) else {
            return;
        };
        if room.remove(id).is_none() {
            return;
        }
        for inbox in room.values() {
            let _ = inbox.send(RoomEvent::PeerLeave(id.clone()));
        }
        if room.is_empty() {
            registry.rooms.remove(key);
        }
    }
}

#[async_trait::async_trait]
impl Connector for MemoryNetwork {
    type Room = MemoryRoom;

    async fn join_room(&self, config: RoomConfig) -> Result<MemoryRoom, TomeTransportError> {
        self.join_room_as(config, PeerId::random())
    }
}

/// One peer's membership in a [`MemoryNetwork`] room.
///
/// Dropping it without calling [`Room::leave`] still removes the peer, so
/// an aborted session looks like a departure to everyone else.
pub struct MemoryRoom {
    id: PeerId,
    key: RoomKey,
    max_message_size: usize,
    network: MemoryNetwork,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
    joined: bool,
}

impl MemoryRoom {
    pub fn is_joined(&self) -> bool {
        self.joined
    }
}

#[async_trait::async_trait]
impl Room for MemoryRoom {
    fn self_id(&self) -> &PeerId {
        &self.id
    }

    async fn send(&self, data: &[u8], target: Option<&PeerId>) -> Result<(), TomeTransportError> {
        if !self.joined {
            return Err(TomeTransportError::Shutdown);
        }
        if data.len() > self.max_message_size {
            return Err(TomeTransportError::MessageTooLarge {
                size: data.len(),
                max: self.max_message_size,
            });
        }

        let registry = self.network.lock();
        let Some(room) = registry.rooms.get(&self.key) else {
            return Err(TomeTransportError::Shutdown);
        };

        match target {
            Some(target) => {
                let inbox = room
                    .get(target)
                    .filter(|_| *target != self.id)
                    .ok_or_else(|| TomeTransportError::PeerNotFound(target.clone()))?;
                let _ = inbox.send(RoomEvent::Message {
                    from: self.id.clone(),
                    data: data.to_vec(),
                });
            }
            None => {
                for (peer, inbox) in room.iter() {
                    if *peer == self.id {
                        continue;
                    }
                    let _ = inbox.send(RoomEvent::Message {
                        from: self.id.clone(),
                        data: data.to_vec(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<RoomEvent, TomeTransportError> {
        if !self.joined {
            return Err(TomeTransportError::Shutdown);
        }
        self.rx.recv().await.ok_or(TomeTransportError::Shutdown)
    }

    async fn leave(&mut self) -> Result<(), TomeTransportError> {
        if self.joined {
            self.joined = false;
            self.network.detach(&self.key, &self.id);
            self.rx.close();
            tracing::debug!(peer = %self.id, "memory: left room");
        }
        Ok(())
    }
}

impl Drop for MemoryRoom {
    fn drop(&mut self) {
        if self.joined {
            self.network.detach(&self.key, &self.id);
        }
    }
}

use std::collections::BTreeSet;

use crate::types::{PeerId, Role};

/// Which members a broadcast reaches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Audience {
    /// Every known member.
    #[default]
    All,
    /// Members that are also listed.
    Only(Vec<PeerId>),
    /// Members that are not listed.
    Except(Vec<PeerId>),
}

/// A session's view of the star.
///
/// On the hub, `members` is the set of admitted spokes. On a spoke it is the
/// set of other spokes the hub has announced. The hub id is set on a spoke
/// once it has answered a valid challenge; on the hub it is the local id.
#[derive(Debug, Clone)]
pub struct Membership {
    role: Role,
    local_id: PeerId,
    hub_id: Option<PeerId>,
    members: BTreeSet<PeerId>,
}

impl Membership {
    pub fn new(role: Role, local_id: PeerId) -> Self {
        let hub_id = match role {
            Role::Hub => Some(local_id.clone()),
            Role::Spoke => None,
        };
        Self {
            role,
            local_id,
            hub_id,
            members: BTreeSet::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn is_hub(&self) -> bool {
        self.role == Role::Hub
    }

    pub fn is_spoke(&self) -> bool {
        self.role == Role::Spoke
    }

    pub fn hub_id(&self) -> Option<&PeerId> {
        self.hub_id.as_ref()
    }

    pub(crate) fn set_hub(&mut self, hub: PeerId) {
        self.hub_id = Some(hub);
    }

    pub(crate) fn clear_hub(&mut self) -> Option<PeerId> {
        self.hub_id.take()
    }

    /// `true` if `peer` is the spoke's hub.
    pub fn is_hub_peer(&self, peer: &PeerId) -> bool {
        self.hub_id.as_ref() == Some(peer)
    }

    /// Returns `false` if `peer` was already present.
    pub(crate) fn add(&mut self, peer: PeerId) -> bool {
        self.members.insert(peer)
    }

    /// Returns `false` if `peer` was not present.
    pub(crate) fn remove(&mut self, peer: &PeerId) -> bool {
        self.members.remove(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.members.contains(peer)
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &PeerId> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members that are in `ids`.
    pub fn include<'a>(&self, ids: impl IntoIterator<Item = &'a PeerId>) -> Vec<PeerId> {
        let wanted: BTreeSet<&PeerId> = ids.into_iter().collect();
        self.members
            .iter()
            .filter(|m| wanted.contains(m))
            .cloned()
            .collect()
    }

    /// Members that are not in `ids`.
    pub fn exclude<'a>(&self, ids: impl IntoIterator<Item = &'a PeerId>) -> Vec<PeerId> {
        let unwanted: BTreeSet<&PeerId> = ids.into_iter().collect();
        self.members
            .iter()
            .filter(|m| !unwanted.contains(m))
            .cloned()
            .collect()
    }

    pub fn select(&self, audience: &Audience) -> Vec<PeerId> {
        match audience {
            Audience::All => self.members.iter().cloned().collect(),
            Audience::Only(ids) => self.include(ids),
            Audience::Except(ids) => self.exclude(ids),
        }
    }
}

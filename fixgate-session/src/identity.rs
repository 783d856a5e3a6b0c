/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session identity.
//!
//! A session is identified by its composite key. The strategy decides which
//! header fields make up the key and how outbound headers are stamped from it;
//! [`SessionIds`] maps each key to a numeric [`SessionId`] that stays the same
//! across reconnects for the lifetime of the process.

use crate::message::SessionHeader;
use fixgate_core::types::{CompId, SessionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a session as seen from this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    /// Our CompID.
    pub local_comp_id: CompId,
    /// Counterparty CompID.
    pub remote_comp_id: CompId,
    /// Our SubID.
    pub local_sub_id: Option<CompId>,
    /// Counterparty SubID.
    pub remote_sub_id: Option<CompId>,
}

impl CompositeKey {
    /// Creates a key without sub ids.
    #[must_use]
    pub const fn new(local_comp_id: CompId, remote_comp_id: CompId) -> Self {
        Self {
            local_comp_id,
            remote_comp_id,
            local_sub_id: None,
            remote_sub_id: None,
        }
    }

    /// Sets the sub ids.
    #[must_use]
    pub const fn with_sub_ids(
        mut self,
        local_sub_id: Option<CompId>,
        remote_sub_id: Option<CompId>,
    ) -> Self {
        self.local_sub_id = local_sub_id;
        self.remote_sub_id = remote_sub_id;
        self
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.local_comp_id, self.remote_comp_id)
    }
}

/// Extracts composite keys from inbound logons and stamps outbound headers.
///
/// Implementations are stateless.
pub trait SessionIdStrategy: Send + Sync + fmt::Debug {
    /// Builds the key from an inbound Logon header.
    ///
    /// Returns `None` when required fields are missing.
    fn on_logon(&self, header: &SessionHeader) -> Option<CompositeKey>;

    /// Writes the identifying fields of `key` into an outbound header.
    fn on_send(&self, key: &CompositeKey, header: &mut SessionHeader);

    /// Returns true if an inbound header belongs to the session `key`.
    ///
    /// Headers without CompIDs, as used by binary protocols after Establish,
    /// are bound by the connection and always match.
    fn matches(&self, key: &CompositeKey, header: &SessionHeader) -> bool {
        if header.sender_comp_id.is_none() && header.target_comp_id.is_none() {
            return true;
        }
        self.on_logon(header).is_some_and(|inbound| inbound == *key)
    }
}

/// Keys sessions on SenderCompID/TargetCompID and their optional sub ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct SenderAndTargetCompIdStrategy;

impl SessionIdStrategy for SenderAndTargetCompIdStrategy {
    fn on_logon(&self, header: &SessionHeader) -> Option<CompositeKey> {
        let local = header.target_comp_id?;
        let remote = header.sender_comp_id?;
        Some(
            CompositeKey::new(local, remote)
                .with_sub_ids(header.target_sub_id, header.sender_sub_id),
        )
    }

    fn on_send(&self, key: &CompositeKey, header: &mut SessionHeader) {
        header.sender_comp_id = Some(key.local_comp_id);
        header.target_comp_id = Some(key.remote_comp_id);
        header.sender_sub_id = key.local_sub_id;
        header.target_sub_id = key.remote_sub_id;
    }
}

#[derive(Debug, Default)]
struct Registry {
    by_key: HashMap<CompositeKey, SessionId>,
    by_id: HashMap<SessionId, CompositeKey>,
    next_id: u64,
}

/// Registry of composite key to session id mappings.
///
/// Ids are allocated from 1.
#[derive(Debug, Default)]
pub struct SessionIds {
    inner: RwLock<Registry>,
}

impl SessionIds {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `key`, allocating one on first sight.
    pub fn on_logon(&self, key: CompositeKey) -> SessionId {
        if let Some(id) = self.get(&key) {
            return id;
        }

        let mut inner = self.inner.write();
        if let Some(id) = inner.by_key.get(&key) {
            return *id;
        }
        inner.next_id += 1;
        let id = SessionId::new(inner.next_id);
        inner.by_key.insert(key, id);
        inner.by_id.insert(id, key);
        id
    }

    /// Returns the id for `key` if it has been seen.
    #[must_use]
    pub fn get(&self, key: &CompositeKey) -> Option<SessionId> {
        self.inner.read().by_key.get(key).copied()
    }

    /// Returns the key registered under `id`.
    #[must_use]
    pub fn key_of(&self, id: SessionId) -> Option<CompositeKey> {
        self.inner.read().by_id.get(&id).copied()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_key.len()
    }

    /// Returns true if no session has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::message::MsgType;

    fn comp(s: &str) -> CompId {
        CompId::new(s).unwrap()
    }

    #[test]
    fn test_strategy_swaps_sender_and_target() {
        let header = SessionHeader::new(MsgType::Logon, 1).with_comp_ids(comp("CLIENT"), comp("GW"));
        let key = SenderAndTargetCompIdStrategy.on_logon(&header).unwrap();
        assert_eq!(key.local_comp_id, comp("GW"));
        assert_eq!(key.remote_comp_id, comp("CLIENT"));

        let mut outbound = SessionHeader::new(MsgType::Heartbeat, 2);
        SenderAndTargetCompIdStrategy.on_send(&key, &mut outbound);
        assert_eq!(outbound.sender_comp_id, Some(comp("GW")));
        assert_eq!(outbound.target_comp_id, Some(comp("CLIENT")));
        assert!(SenderAndTargetCompIdStrategy.matches(&key, &header));
    }

    #[test]
    fn test_strategy_requires_comp_ids() {
        let header = SessionHeader::new(MsgType::Logon, 1);
        assert!(SenderAndTargetCompIdStrategy.on_logon(&header).is_none());
    }

    #[test]
    fn test_registry_is_stable_across_logons() {
        let ids = SessionIds::new();
        let a = CompositeKey::new(comp("GW"), comp("A"));
        let b = CompositeKey::new(comp("GW"), comp("B"));

        let first = ids.on_logon(a);
        assert_eq!(first, SessionId::new(1));
        assert_eq!(ids.on_logon(b), SessionId::new(2));
        assert_eq!(ids.on_logon(a), first);
        assert_eq!(ids.key_of(first), Some(a));
        assert_eq!(ids.len(), 2);
    }
}

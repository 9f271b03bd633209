//! Root membership mirror for a subscription.
//!
//! Mirrors the compiled query's root result: which nodes belong and in what
//! order. Ordering keys are the covering index's composite keys (absent for
//! direct-lookup queries), with node id as the final tiebreak, so a
//! membership change positions in O(log n) without rescanning the index.

use rustc_hash::FxHashMap;

use crate::index::IndexKey;
use crate::model::NodeId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RootKey {
    key: Option<IndexKey>,
    id: NodeId,
}

/// Ordered root membership.
#[derive(Debug, Default)]
pub(crate) struct ResultSet {
    entries: Vec<RootKey>,
    keys: FxHashMap<NodeId, Option<IndexKey>>,
}

impl ResultSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.keys.contains_key(&id)
    }

    /// The stored ordering key for a member.
    pub(crate) fn key_of(&self, id: NodeId) -> Option<&Option<IndexKey>> {
        self.keys.get(&id)
    }

    /// Current position of a member.
    pub(crate) fn position_of(&self, id: NodeId) -> Option<usize> {
        let key = self.keys.get(&id)?;
        let entry = RootKey {
            key: key.clone(),
            id,
        };
        self.entries.binary_search(&entry).ok()
    }

    /// Inserts a member at its sorted position, returning that position.
    pub(crate) fn insert(&mut self, id: NodeId, key: Option<IndexKey>) -> usize {
        debug_assert!(!self.keys.contains_key(&id), "member inserted twice");
        let entry = RootKey {
            key: key.clone(),
            id,
        };
        let position = self.entries.partition_point(|e| *e < entry);
        self.entries.insert(position, entry);
        self.keys.insert(id, key);
        position
    }

    /// Removes a member, returning its former position.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<usize> {
        let position = self.position_of(id)?;
        self.entries.remove(position);
        self.keys.remove(&id);
        Some(position)
    }

    /// Member ids in order (test support).
    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

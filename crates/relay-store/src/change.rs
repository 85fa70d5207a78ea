//! Change tracking for write passes.
//!
//! Writers record which ids they created or updated in a [`ChangeTracker`].
//! When a pass finishes the tracker becomes a [`ChangeSet`] and every id is
//! broadcast through the injected [`ChangeEmitter`].

use indexmap::IndexSet;
use relay_core::DataId;
use serde::Serialize;

/// Ids touched by one write pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub created: IndexSet<DataId>,
    pub updated: IndexSet<DataId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }

    /// Folds `other` into this set. Ids created by either pass stay created.
    pub fn merge(&mut self, other: ChangeSet) {
        for id in other.created {
            self.updated.shift_remove(&id);
            self.created.insert(id);
        }
        for id in other.updated {
            if !self.created.contains(&id) {
                self.updated.insert(id);
            }
        }
    }

    /// Updated ids followed by created ids, the order they are broadcast in.
    pub fn ids(&self) -> impl Iterator<Item = &DataId> {
        self.updated.iter().chain(self.created.iter())
    }
}

/// Accumulates created and updated ids during a write pass.
///
/// An id created in the pass is never also reported as updated.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    created: IndexSet<DataId>,
    updated: IndexSet<DataId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        ChangeTracker::default()
    }

    pub fn create_id(&mut self, id: &DataId) {
        self.updated.shift_remove(id);
        self.created.insert(id.clone());
    }

    pub fn update_id(&mut self, id: &DataId) {
        if !self.created.contains(id) {
            self.updated.insert(id.clone());
        }
    }

    pub fn is_created(&self, id: &DataId) -> bool {
        self.created.contains(id)
    }

    pub fn is_updated(&self, id: &DataId) -> bool {
        self.updated.contains(id)
    }

    pub fn change_set(self) -> ChangeSet {
        ChangeSet {
            created: self.created,
            updated: self.updated,
        }
    }
}

/// Receives change notifications for individual records.
pub trait ChangeEmitter {
    fn broadcast_change_for_id(&mut self, id: &DataId);
}

impl<F> ChangeEmitter for F
where
    F: FnMut(&DataId),
{
    fn broadcast_change_for_id(&mut self, id: &DataId) {
        self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_ids_are_not_updated() {
        let mut tracker = ChangeTracker::new();
        let a = DataId::from("a");
        let b = DataId::from("b");
        tracker.update_id(&a);
        tracker.create_id(&a);
        tracker.create_id(&b);
        tracker.update_id(&b);

        let changes = tracker.change_set();
        assert!(changes.updated.is_empty());
        assert_eq!(changes.created.len(), 2);
    }

    #[test]
    fn merging_keeps_created_ids_created() {
        let mut first = ChangeTracker::new();
        first.update_id(&"a".into());
        let mut second = ChangeTracker::new();
        second.create_id(&"a".into());
        second.update_id(&"b".into());

        let mut changes = first.change_set();
        changes.merge(second.change_set());
        assert!(changes.created.contains("a"));
        assert!(!changes.updated.contains("a"));
        assert!(changes.updated.contains("b"));
    }

    #[test]
    fn closures_are_emitters() {
        let mut seen = Vec::new();
        {
            let mut emitter = |id: &DataId| seen.push(id.clone());
            emitter.broadcast_change_for_id(&"x".into());
        }
        assert_eq!(seen, vec![DataId::from("x")]);
    }

    #[test]
    fn broadcast_order_is_updated_then_created() {
        let mut tracker = ChangeTracker::new();
        tracker.create_id(&"new".into());
        tracker.update_id(&"old".into());
        let changes = tracker.change_set();
        let order: Vec<&str> = changes.ids().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["old", "new"]);
    }
}

//! The queue of pending mutations.
//!
//! Each mutation gets a [`ClientMutationId`] when created and moves through
//! [`MutationStatus`]. The queue only keeps bookkeeping and the optimistic
//! payloads; [`StoreData`](crate::StoreData) rebuilds the queued tier from
//! [`MutationQueue::optimistic_updates`] whenever a mutation leaves it.

use indexmap::IndexMap;
use relay_core::ClientMutationId;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::StoreError;
use crate::update::UpdatePayload;

/// Lifecycle of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationStatus {
    /// Created, nothing applied yet.
    Created,
    /// Optimistic update applied, waiting for the server.
    Uncommitted,
    Committed,
    /// The server rejected it. It may be committed again or rolled back.
    CommitFailed,
    RolledBack,
}

impl MutationStatus {
    /// True once the mutation can no longer change.
    pub fn is_final(self) -> bool {
        matches!(self, MutationStatus::Committed | MutationStatus::RolledBack)
    }
}

#[derive(Debug, Clone)]
struct PendingMutation {
    status: MutationStatus,
    optimistic: Option<UpdatePayload>,
}

/// Final statuses remembered after a mutation leaves the queue.
const FINISHED_HISTORY: usize = 32;

/// Pending mutations in creation order.
///
/// A mutation is dropped as soon as it commits or rolls back. Its final
/// status stays readable for the most recent [`FINISHED_HISTORY`] ids.
#[derive(Debug, Default)]
pub struct MutationQueue {
    mutations: IndexMap<ClientMutationId, PendingMutation>,
    finished: IndexMap<ClientMutationId, MutationStatus>,
    next_id: u64,
}

impl MutationQueue {
    pub fn new() -> Self {
        MutationQueue::default()
    }

    /// Registers a new mutation and returns its id.
    pub fn create(&mut self) -> ClientMutationId {
        let id = ClientMutationId::new(self.next_id.to_string());
        self.next_id += 1;
        self.mutations.insert(
            id.clone(),
            PendingMutation {
                status: MutationStatus::Created,
                optimistic: None,
            },
        );
        id
    }

    /// Number of mutations that have not committed or rolled back.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn status(&self, id: &ClientMutationId) -> Option<MutationStatus> {
        self.mutations
            .get(id)
            .map(|mutation| mutation.status)
            .or_else(|| self.finished.get(id).copied())
    }

    fn transition(
        &mut self,
        id: &ClientMutationId,
        operation: &'static str,
        allowed: &[MutationStatus],
        next: MutationStatus,
    ) -> Result<(), StoreError> {
        let status = match self.status(id) {
            Some(status) => status,
            None => {
                error!(%id, operation, "unknown mutation");
                return Err(StoreError::MutationNotFound { id: id.clone() });
            }
        };
        if !allowed.contains(&status) {
            error!(%id, operation, ?status, "invalid mutation transition");
            return Err(StoreError::InvalidMutationStatus {
                id: id.clone(),
                status,
                operation,
            });
        }
        if next.is_final() {
            self.mutations.shift_remove(id);
            self.finished.insert(id.clone(), next);
            if self.finished.len() > FINISHED_HISTORY {
                self.finished.shift_remove_index(0);
            }
        } else if let Some(mutation) = self.mutations.get_mut(id) {
            mutation.status = next;
        }
        Ok(())
    }

    /// Records the optimistic payload of a created mutation.
    pub fn set_optimistic(&mut self, id: &ClientMutationId, payload: UpdatePayload) -> Result<(), StoreError> {
        self.transition(
            id,
            "apply an optimistic update to",
            &[MutationStatus::Created],
            MutationStatus::Uncommitted,
        )?;
        if let Some(mutation) = self.mutations.get_mut(id) {
            mutation.optimistic = Some(payload);
        }
        Ok(())
    }

    pub fn mark_committed(&mut self, id: &ClientMutationId) -> Result<(), StoreError> {
        self.transition(
            id,
            "commit",
            &[
                MutationStatus::Created,
                MutationStatus::Uncommitted,
                MutationStatus::CommitFailed,
            ],
            MutationStatus::Committed,
        )
    }

    /// A failed mutation stops contributing its optimistic update.
    pub fn mark_failed(&mut self, id: &ClientMutationId) -> Result<(), StoreError> {
        self.transition(
            id,
            "fail",
            &[MutationStatus::Created, MutationStatus::Uncommitted],
            MutationStatus::CommitFailed,
        )
    }

    pub fn mark_rolled_back(&mut self, id: &ClientMutationId) -> Result<(), StoreError> {
        self.transition(
            id,
            "roll back",
            &[
                MutationStatus::Created,
                MutationStatus::Uncommitted,
                MutationStatus::CommitFailed,
            ],
            MutationStatus::RolledBack,
        )
    }

    /// Optimistic payloads still in effect, in submission order.
    pub fn optimistic_updates(&self) -> impl Iterator<Item = (&ClientMutationId, &UpdatePayload)> {
        self.mutations.iter().filter_map(|(id, mutation)| {
            match (mutation.status, &mutation.optimistic) {
                (MutationStatus::Uncommitted, Some(payload)) => Some((id, payload)),
                _ => None,
            }
        })
    }

    /// Ids of mutations that have not reached a final status.
    pub fn pending_ids(&self) -> Vec<ClientMutationId> {
        self.mutations.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Call, QueryOperation};
    use serde_json::Map;

    fn payload() -> UpdatePayload {
        let operation = QueryOperation::build("Noop", "NoopPayload", Call::new("noop", Map::new()), Vec::new());
        UpdatePayload::new(operation, Map::new())
    }

    #[test]
    fn lifecycle_moves_forward() {
        let mut queue = MutationQueue::new();
        let id = queue.create();
        assert_eq!(queue.status(&id), Some(MutationStatus::Created));

        queue.set_optimistic(&id, payload()).unwrap();
        assert_eq!(queue.status(&id), Some(MutationStatus::Uncommitted));
        assert_eq!(queue.optimistic_updates().count(), 1);

        queue.mark_failed(&id).unwrap();
        assert_eq!(queue.optimistic_updates().count(), 0);
        assert_eq!(queue.pending_ids(), vec![id.clone()]);

        queue.mark_committed(&id).unwrap();
        assert_eq!(queue.status(&id), Some(MutationStatus::Committed));
        assert!(queue.pending_ids().is_empty());
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut queue = MutationQueue::new();
        let id = queue.create();
        queue.mark_rolled_back(&id).unwrap();

        let err = queue.mark_committed(&id).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidMutationStatus {
                status: MutationStatus::RolledBack,
                ..
            }
        ));
        assert!(matches!(
            queue.mark_failed(&"missing".into()).unwrap_err(),
            StoreError::MutationNotFound { .. }
        ));
    }

    #[test]
    fn optimistic_updates_follow_creation_order() {
        let mut queue = MutationQueue::new();
        let first = queue.create();
        let second = queue.create();
        queue.set_optimistic(&second, payload()).unwrap();
        queue.set_optimistic(&first, payload()).unwrap();
        let order: Vec<_> = queue.optimistic_updates().map(|(id, _)| id.clone()).collect();
        assert_eq!(order, vec![first, second]);
    }

    #[test]
    fn finished_mutations_leave_the_queue() {
        let mut queue = MutationQueue::new();
        let committed = queue.create();
        queue.set_optimistic(&committed, payload()).unwrap();
        queue.mark_committed(&committed).unwrap();
        let rolled_back = queue.create();
        queue.set_optimistic(&rolled_back, payload()).unwrap();
        queue.mark_rolled_back(&rolled_back).unwrap();

        assert!(queue.is_empty());
        assert_eq!(queue.optimistic_updates().count(), 0);
        assert_eq!(queue.status(&committed), Some(MutationStatus::Committed));
        assert_eq!(queue.status(&rolled_back), Some(MutationStatus::RolledBack));
    }

    #[test]
    fn finished_history_is_bounded() {
        let mut queue = MutationQueue::new();
        let first = queue.create();
        queue.mark_committed(&first).unwrap();
        for _ in 0..1000 {
            let id = queue.create();
            queue.set_optimistic(&id, payload()).unwrap();
            queue.mark_committed(&id).unwrap();
        }
        assert_eq!(queue.len(), 0);
        assert!(queue.finished.len() <= FINISHED_HISTORY);
        assert_eq!(queue.status(&first), None);
        assert_eq!(queue.status(&"1000".into()), Some(MutationStatus::Committed));
    }
}

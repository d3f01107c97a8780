use strum_macros::{Display, EnumString};

/// Lifecycle of a [crate::sync::SyncRow], per spec.md §3.
///
/// `DELETE_PENDING` is reachable from any non-terminal status; `DELETED` is
/// reachable only from `DELETE_PENDING`, never directly from `PENDING`
/// (spec.md §8, invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    InProgress,
    InSync,
    Failed,
    DeletePending,
    Deleted,
}

impl SyncStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, InSync)
                | (InProgress, Failed)
                | (Pending, DeletePending)
                | (InProgress, DeletePending)
                | (InSync, DeletePending)
                | (Failed, DeletePending)
                | (DeletePending, Deleted)
        )
    }
}

/// Lifecycle of a [crate::publication::PublicationRow], per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Pending,
    InProgress,
    Published,
    Failed,
}

impl PublicationStatus {
    pub fn can_transition_to(self, next: PublicationStatus) -> bool {
        use PublicationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Published) | (InProgress, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_is_unreachable_directly_from_pending() {
        assert!(!SyncStatus::Pending.can_transition_to(SyncStatus::Deleted));
    }

    #[test]
    fn delete_pending_reachable_from_every_active_state() {
        assert!(SyncStatus::Pending.can_transition_to(SyncStatus::DeletePending));
        assert!(SyncStatus::InProgress.can_transition_to(SyncStatus::DeletePending));
        assert!(SyncStatus::InSync.can_transition_to(SyncStatus::DeletePending));
        assert!(SyncStatus::Failed.can_transition_to(SyncStatus::DeletePending));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges_besides_delete() {
        assert!(!SyncStatus::Deleted.can_transition_to(SyncStatus::Pending));
    }

    #[test]
    fn publication_lifecycle() {
        assert!(PublicationStatus::Pending.can_transition_to(PublicationStatus::InProgress));
        assert!(PublicationStatus::InProgress.can_transition_to(PublicationStatus::Published));
        assert!(PublicationStatus::InProgress.can_transition_to(PublicationStatus::Failed));
        assert!(!PublicationStatus::Pending.can_transition_to(PublicationStatus::Published));
    }
}

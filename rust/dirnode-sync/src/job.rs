use uuid::Uuid;

/// A unit of work dispatched by the [crate::scheduler::Scheduler] onto the
/// bounded worker queue (spec.md §4.5).
#[derive(Debug, Clone, strum_macros::Display)]
pub enum SyncJob {
    /// Negotiate credentials, reconfigure the local registry, and start
    /// monitoring for a `PENDING` sync row that was just moved to
    /// `IN_PROGRESS`.
    SyncCreate { sync_id: Uuid },
    /// Tear down the upstream entry for a `DELETE_PENDING` sync row and
    /// hand off to the monitor's graceful shutdown.
    SyncDelete { sync_id: Uuid },
}

//! Sync outcomes and the [`Fetchable`] capability.

use std::cell::Cell;
use std::rc::Rc;

use nimbus_core::{DependencyId, EventStream, Instant, Observable, Pending, Subscription};

use crate::error::SyncError;

/// How one fetch or save ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The target now holds the server's data.
    Synced,
    /// No response arrived before the store's timeout.
    TimedOut,
    Failed(SyncError),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    #[must_use]
    pub const fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        match self {
            Self::Synced => SyncStatus::Synced,
            Self::TimedOut => SyncStatus::TimedOut,
            Self::Failed(_) => SyncStatus::Failed,
        }
    }
}

/// Result of the last completed sync of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// No sync has completed yet.
    #[default]
    Unloaded,
    Synced,
    TimedOut,
    Failed,
}

/// Lifecycle notifications of a fetchable target.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started,
    Settled(SyncOutcome),
}

/// Anything a live updater can refresh.
pub trait Fetchable {
    /// Start a sync. The returned handle settles exactly once.
    fn fetch(&self) -> Pending<SyncOutcome>;

    /// Outcome of the last completed sync.
    fn sync_status(&self) -> SyncStatus;

    /// When the last successful sync completed.
    fn last_synced(&self) -> Option<Instant>;

    /// Registry key of this target.
    fn dependency_id(&self) -> DependencyId;
}

/// Shared sync bookkeeping for models and collections.
#[derive(Clone)]
pub(crate) struct SyncTracker {
    status: Observable<SyncStatus>,
    in_flight: Rc<Cell<usize>>,
    last_synced: Rc<Cell<Option<Instant>>>,
    events: EventStream<SyncEvent>,
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self {
            status: Observable::new(SyncStatus::Unloaded),
            in_flight: Rc::new(Cell::new(0)),
            last_synced: Rc::new(Cell::new(None)),
            events: EventStream::new(),
        }
    }
}

impl SyncTracker {
    pub(crate) fn begin(&self) {
        self.in_flight.set(self.in_flight.get() + 1);
        self.events.emit(&SyncEvent::Started);
    }

    pub(crate) fn finish(&self, outcome: &SyncOutcome, now: Instant) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        if outcome.is_synced() {
            self.last_synced.set(Some(now));
        }
        self.status.set(outcome.status());
        self.events.emit(&SyncEvent::Settled(outcome.clone()));
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.status.get()
    }

    pub(crate) fn is_syncing(&self) -> bool {
        self.in_flight.get() > 0
    }

    pub(crate) fn last_synced(&self) -> Option<Instant> {
        self.last_synced.get()
    }

    pub(crate) fn events(&self) -> &EventStream<SyncEvent> {
        &self.events
    }

    pub(crate) fn subscribe_status(&self, f: impl Fn(&SyncStatus) + 'static) -> Subscription {
        self.status.subscribe(f)
    }
}

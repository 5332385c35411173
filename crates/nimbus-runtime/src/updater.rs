#![forbid(unsafe_code)]

//! Live updaters: drive refresh cycles of one [`Fetchable`] target.
//!
//! # State Machine
//!
//! ```text
//!            update()                 fetch settles
//!   Idle ────────────────▶ Updating ─────────────────▶ Idle
//!                             │   (synced, timed out, or failed)
//!                             │
//!                  update() ──┘ returns InFlight, no fetch
//! ```
//!
//! There is no error state. A failed or timed-out fetch returns the updater
//! to `Idle` so the next scheduling opportunity can retry.
//!
//! # Invariants
//!
//! 1. At most one fetch started by an updater is in flight at any time.
//! 2. The completion hook runs once per settled fetch, after the state is
//!    back to `Idle`.
//! 3. After [`LiveUpdater::dispose`], no hook runs, including for a fetch
//!    that settles later.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use nimbus_core::Subscription;
use nimbus_model::{Fetchable, SyncOutcome};
use tracing::trace;

/// Where an updater is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdaterState {
    #[default]
    Idle,
    Updating,
}

/// What a call to [`LiveUpdater::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    /// A fetch was started.
    Started,
    /// A fetch was already in flight; nothing was started.
    InFlight,
    /// The updater was disposed; nothing was started.
    Disposed,
}

/// Drives refresh cycles of one target.
pub trait LiveUpdater {
    /// Start a refresh cycle unless one is running.
    fn update(&self) -> UpdateTrigger;

    fn state(&self) -> UpdaterState;

    /// Detach from the target for good.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

type CompletionHook = Rc<dyn Fn(&SyncOutcome)>;

struct FetchingInner {
    target: Rc<dyn Fetchable>,
    state: Cell<UpdaterState>,
    disposed: Cell<bool>,
    listener: RefCell<Option<Subscription>>,
    hook: RefCell<Option<CompletionHook>>,
    last_outcome: RefCell<Option<SyncOutcome>>,
    fetches: Cell<u64>,
}

/// Calls `fetch()` on its target and waits for the result.
///
/// Cloning yields another handle to the same updater.
#[derive(Clone)]
pub struct FetchingLiveUpdater {
    inner: Rc<FetchingInner>,
}

impl fmt::Debug for FetchingLiveUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchingLiveUpdater")
            .field("target", &self.inner.target.dependency_id())
            .field("state", &self.inner.state.get())
            .field("disposed", &self.inner.disposed.get())
            .field("fetches", &self.inner.fetches.get())
            .finish()
    }
}

impl FetchingLiveUpdater {
    #[must_use]
    pub fn new(target: Rc<dyn Fetchable>) -> Self {
        Self {
            inner: Rc::new(FetchingInner {
                target,
                state: Cell::new(UpdaterState::Idle),
                disposed: Cell::new(false),
                listener: RefCell::new(None),
                hook: RefCell::new(None),
                last_outcome: RefCell::new(None),
                fetches: Cell::new(0),
            }),
        }
    }

    /// Run `hook` after every settled fetch. Replaces any previous hook.
    pub fn on_complete(&self, hook: impl Fn(&SyncOutcome) + 'static) {
        *self.inner.hook.borrow_mut() = Some(Rc::new(hook));
    }

    #[must_use]
    pub fn target(&self) -> &Rc<dyn Fetchable> {
        &self.inner.target
    }

    /// Outcome of the last fetch this updater saw settle.
    #[must_use]
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.inner.last_outcome.borrow().clone()
    }

    /// Number of fetches started.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.get()
    }

    fn downgrade(&self) -> Weak<FetchingInner> {
        Rc::downgrade(&self.inner)
    }

    fn complete(&self, outcome: &SyncOutcome) {
        let inner = &self.inner;
        if inner.disposed.get() {
            return;
        }
        inner.state.set(UpdaterState::Idle);
        let finished = inner.listener.borrow_mut().take();
        drop(finished);
        *inner.last_outcome.borrow_mut() = Some(outcome.clone());
        trace!(target_id = %inner.target.dependency_id(), ?outcome, "updater idle");
        let hook = inner.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(outcome);
        }
    }
}

impl LiveUpdater for FetchingLiveUpdater {
    fn update(&self) -> UpdateTrigger {
        let inner = &self.inner;
        if inner.disposed.get() {
            return UpdateTrigger::Disposed;
        }
        if inner.state.get() == UpdaterState::Updating {
            trace!(target_id = %inner.target.dependency_id(), "update skipped, fetch in flight");
            return UpdateTrigger::InFlight;
        }
        inner.state.set(UpdaterState::Updating);
        let cycle = inner.fetches.get() + 1;
        inner.fetches.set(cycle);
        trace!(target_id = %inner.target.dependency_id(), cycle, "updater fetching");

        let pending = inner.target.fetch();
        let weak = self.downgrade();
        let listener = pending.on_settled(move |outcome| {
            if let Some(inner) = weak.upgrade() {
                FetchingLiveUpdater { inner }.complete(outcome);
            }
        });
        // A settled fetch leaves an inert guard, and its hook may have started
        // a newer cycle whose listener is already stored.
        if inner.fetches.get() == cycle && inner.state.get() == UpdaterState::Updating {
            *inner.listener.borrow_mut() = Some(listener);
        }
        UpdateTrigger::Started
    }

    fn state(&self) -> UpdaterState {
        self.inner.state.get()
    }

    fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }
        let listener = inner.listener.borrow_mut().take();
        drop(listener);
        let hook = inner.hook.borrow_mut().take();
        drop(hook);
        inner.state.set(UpdaterState::Idle);
        trace!(target_id = %inner.target.dependency_id(), "updater disposed");
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::testing::CallLog;
    use nimbus_core::{DependencyId, Instant, Pending, Resolver};
    use nimbus_model::SyncStatus;

    /// A target whose fetches are settled by hand.
    #[derive(Default)]
    struct ManualTarget {
        resolvers: RefCell<Vec<Resolver<SyncOutcome>>>,
    }

    impl ManualTarget {
        fn settle(&self, outcome: SyncOutcome) {
            let resolver = self.resolvers.borrow_mut().remove(0);
            resolver.resolve(outcome);
        }

        fn started(&self) -> usize {
            self.resolvers.borrow().len()
        }
    }

    impl Fetchable for ManualTarget {
        fn fetch(&self) -> Pending<SyncOutcome> {
            let (pending, resolver) = Pending::channel();
            self.resolvers.borrow_mut().push(resolver);
            pending
        }

        fn sync_status(&self) -> SyncStatus {
            SyncStatus::Unloaded
        }

        fn last_synced(&self) -> Option<Instant> {
            None
        }

        fn dependency_id(&self) -> DependencyId {
            DependencyId::from_url("/manual")
        }
    }

    fn updater() -> (Rc<ManualTarget>, FetchingLiveUpdater, CallLog<SyncOutcome>) {
        let target = Rc::new(ManualTarget::default());
        let updater = FetchingLiveUpdater::new(Rc::clone(&target) as Rc<dyn Fetchable>);
        let log = CallLog::new();
        updater.on_complete(log.recorder(SyncOutcome::clone));
        (target, updater, log)
    }

    #[test]
    fn no_double_fetch_while_updating() {
        let (target, updater, log) = updater();
        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(updater.state(), UpdaterState::Updating);
        assert_eq!(updater.update(), UpdateTrigger::InFlight);
        assert_eq!(target.started(), 1);

        target.settle(SyncOutcome::Synced);
        assert_eq!(updater.state(), UpdaterState::Idle);
        assert_eq!(log.entries(), [SyncOutcome::Synced]);
        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(updater.fetch_count(), 2);
    }

    #[test]
    fn timeout_returns_to_idle() {
        let (target, updater, log) = updater();
        updater.update();
        target.settle(SyncOutcome::TimedOut);
        assert_eq!(updater.state(), UpdaterState::Idle);
        assert_eq!(updater.last_outcome(), Some(SyncOutcome::TimedOut));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn disposed_updater_ignores_late_completion() {
        let (target, updater, log) = updater();
        updater.update();
        updater.dispose();
        target.settle(SyncOutcome::Synced);
        assert!(log.is_empty());
        assert_eq!(updater.update(), UpdateTrigger::Disposed);
        assert_eq!(target.started(), 0);
    }

    #[test]
    fn synchronous_completion() {
        struct Instant0;
        impl Fetchable for Instant0 {
            fn fetch(&self) -> Pending<SyncOutcome> {
                Pending::ready(SyncOutcome::Synced)
            }
            fn sync_status(&self) -> SyncStatus {
                SyncStatus::Synced
            }
            fn last_synced(&self) -> Option<Instant> {
                None
            }
            fn dependency_id(&self) -> DependencyId {
                DependencyId::from_url("/now")
            }
        }
        let updater = FetchingLiveUpdater::new(Rc::new(Instant0));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        updater.on_complete(move |_| h.set(h.get() + 1));
        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(updater.state(), UpdaterState::Idle);
        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn hook_restarting_after_synchronous_completion_keeps_listener() {
        /// First fetch answers immediately, later ones wait for `settle`.
        #[derive(Default)]
        struct FirstReady {
            inner: ManualTarget,
            calls: Cell<usize>,
        }
        impl Fetchable for FirstReady {
            fn fetch(&self) -> Pending<SyncOutcome> {
                self.calls.set(self.calls.get() + 1);
                if self.calls.get() == 1 {
                    Pending::ready(SyncOutcome::Synced)
                } else {
                    self.inner.fetch()
                }
            }
            fn sync_status(&self) -> SyncStatus {
                SyncStatus::Unloaded
            }
            fn last_synced(&self) -> Option<Instant> {
                None
            }
            fn dependency_id(&self) -> DependencyId {
                DependencyId::from_url("/first-ready")
            }
        }

        let target = Rc::new(FirstReady::default());
        let updater = FetchingLiveUpdater::new(Rc::clone(&target) as Rc<dyn Fetchable>);
        let restarts = Rc::new(Cell::new(0));
        let weak = updater.downgrade();
        let r = Rc::clone(&restarts);
        updater.on_complete(move |_| {
            if r.get() == 0 {
                r.set(1);
                if let Some(inner) = weak.upgrade() {
                    FetchingLiveUpdater { inner }.update();
                }
            }
        });

        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(updater.fetch_count(), 2);
        assert_eq!(updater.state(), UpdaterState::Updating);

        target.inner.settle(SyncOutcome::Synced);
        assert_eq!(updater.state(), UpdaterState::Idle);
        assert_eq!(updater.update(), UpdateTrigger::Started);
        assert_eq!(updater.fetch_count(), 3);
    }
}

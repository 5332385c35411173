#![forbid(unsafe_code)]

//! Interval polling on top of [`FetchingLiveUpdater`].
//!
//! [`PollingLiveUpdater::start`] fetches immediately, then re-arms a timer
//! for `interval()` each time a cycle completes. A slow fetch delays the
//! next one by its own duration; there is no catch-up.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use nimbus_core::{Duration, Scheduler, TimerId};
use nimbus_model::{Fetchable, SyncOutcome};
use tracing::trace;

use crate::updater::{FetchingLiveUpdater, LiveUpdater, UpdateTrigger, UpdaterState};

/// Default time between the end of one cycle and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(15_000);

/// Shorter intervals, zero included, are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct PollingInner {
    fetcher: FetchingLiveUpdater,
    scheduler: Scheduler,
    interval: Cell<Duration>,
    timer: Cell<Option<TimerId>>,
    running: Cell<bool>,
    hook: RefCell<Option<Rc<dyn Fn(&SyncOutcome)>>>,
}

/// Refreshes its target every `interval()` while running.
///
/// Cloning yields another handle to the same poller.
#[derive(Clone)]
pub struct PollingLiveUpdater {
    inner: Rc<PollingInner>,
}

impl fmt::Debug for PollingLiveUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingLiveUpdater")
            .field("fetcher", &self.inner.fetcher)
            .field("interval", &self.inner.interval.get())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl PollingLiveUpdater {
    #[must_use]
    pub fn new(target: Rc<dyn Fetchable>, scheduler: &Scheduler, interval: Duration) -> Self {
        let inner = Rc::new(PollingInner {
            fetcher: FetchingLiveUpdater::new(target),
            scheduler: scheduler.clone(),
            interval: Cell::new(interval.max(MIN_POLL_INTERVAL)),
            timer: Cell::new(None),
            running: Cell::new(false),
            hook: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        inner.fetcher.on_complete(move |outcome| {
            if let Some(inner) = weak.upgrade() {
                PollingLiveUpdater { inner }.cycle_complete(outcome);
            }
        });
        Self { inner }
    }

    /// A poller with [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn with_default_interval(target: Rc<dyn Fetchable>, scheduler: &Scheduler) -> Self {
        Self::new(target, scheduler, DEFAULT_POLL_INTERVAL)
    }

    /// Begin polling with an immediate fetch.
    pub fn start(&self) -> UpdateTrigger {
        if self.is_disposed() {
            return UpdateTrigger::Disposed;
        }
        self.inner.running.set(true);
        trace!(interval_ms = self.interval().as_millis() as u64, "polling started");
        self.update()
    }

    /// Stop polling. An in-flight fetch still completes.
    pub fn stop(&self) {
        self.inner.running.set(false);
        self.disarm();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval.get()
    }

    /// Change the interval. Takes effect from the next scheduled cycle.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.interval.set(interval.max(MIN_POLL_INTERVAL));
    }

    /// Run `hook` after every completed cycle.
    pub fn on_complete(&self, hook: impl Fn(&SyncOutcome) + 'static) {
        *self.inner.hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Whether a timer for the next cycle is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner
            .timer
            .get()
            .is_some_and(|id| self.inner.scheduler.is_scheduled(id))
    }

    #[must_use]
    pub fn fetcher(&self) -> &FetchingLiveUpdater {
        &self.inner.fetcher
    }

    fn downgrade(&self) -> Weak<PollingInner> {
        Rc::downgrade(&self.inner)
    }

    fn disarm(&self) {
        if let Some(id) = self.inner.timer.take() {
            self.inner.scheduler.cancel(id);
        }
    }

    fn cycle_complete(&self, outcome: &SyncOutcome) {
        if self.inner.running.get() {
            self.disarm();
            let weak = self.downgrade();
            let id = self.inner.scheduler.schedule(self.interval(), move || {
                if let Some(inner) = weak.upgrade() {
                    inner.timer.set(None);
                    PollingLiveUpdater { inner }.update();
                }
            });
            self.inner.timer.set(Some(id));
        }
        let hook = self.inner.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(outcome);
        }
    }
}

impl LiveUpdater for PollingLiveUpdater {
    fn update(&self) -> UpdateTrigger {
        let trigger = self.inner.fetcher.update();
        if trigger == UpdateTrigger::Started {
            // Synchronous completions re-arm inside `update`; keep that timer.
            if self.inner.fetcher.state() == UpdaterState::Updating {
                self.disarm();
            }
        }
        trigger
    }

    fn state(&self) -> UpdaterState {
        self.inner.fetcher.state()
    }

    fn dispose(&self) {
        self.stop();
        self.inner.hook.borrow_mut().take();
        self.inner.fetcher.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.fetcher.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::{DependencyId, Instant, LabClock, Pending, Resolver};
    use nimbus_model::SyncStatus;

    #[derive(Default)]
    struct ManualTarget {
        resolvers: RefCell<Vec<Resolver<SyncOutcome>>>,
        fetches: Cell<usize>,
    }

    impl ManualTarget {
        fn settle(&self, outcome: SyncOutcome) {
            let resolver = self.resolvers.borrow_mut().remove(0);
            resolver.resolve(outcome);
        }
    }

    impl Fetchable for ManualTarget {
        fn fetch(&self) -> Pending<SyncOutcome> {
            self.fetches.set(self.fetches.get() + 1);
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

    fn poller(interval_ms: u64) -> (Rc<ManualTarget>, PollingLiveUpdater, Scheduler) {
        let clock = LabClock::new();
        let scheduler = Scheduler::lab(&clock);
        let target = Rc::new(ManualTarget::default());
        let poller = PollingLiveUpdater::new(
            Rc::clone(&target) as Rc<dyn Fetchable>,
            &scheduler,
            Duration::from_millis(interval_ms),
        );
        (target, poller, scheduler)
    }

    #[test]
    fn start_fetches_once_before_any_timer() {
        let (target, poller, scheduler) = poller(1_000);
        assert_eq!(poller.start(), UpdateTrigger::Started);
        assert_eq!(target.fetches.get(), 1);
        assert_eq!(scheduler.pending(), 0);
        scheduler.advance(Duration::from_millis(5_000));
        assert_eq!(target.fetches.get(), 1);
    }

    #[test]
    fn next_cycle_waits_for_completion_plus_interval() {
        let (target, poller, scheduler) = poller(1_000);
        poller.start();
        scheduler.advance(Duration::from_millis(300));
        target.settle(SyncOutcome::Synced);
        assert!(poller.is_armed());

        scheduler.advance(Duration::from_millis(999));
        assert_eq!(target.fetches.get(), 1);
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(target.fetches.get(), 2);
        assert_eq!(poller.state(), UpdaterState::Updating);
    }

    #[test]
    fn failures_keep_polling() {
        let (target, poller, scheduler) = poller(100);
        poller.start();
        target.settle(SyncOutcome::TimedOut);
        scheduler.advance(Duration::from_millis(100));
        target.settle(SyncOutcome::Failed(nimbus_model::SyncError::NoStore));
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(target.fetches.get(), 3);
    }

    #[test]
    fn interval_round_trips() {
        let (_, poller, _) = poller(1);
        assert_eq!(poller.interval(), Duration::from_millis(1));
        poller.set_interval(Duration::from_millis(42_000));
        assert_eq!(poller.interval(), Duration::from_millis(42_000));
    }

    #[test]
    fn default_interval_is_fifteen_seconds() {
        let scheduler = Scheduler::new();
        let poller = PollingLiveUpdater::with_default_interval(
            Rc::new(ManualTarget::default()),
            &scheduler,
        );
        assert_eq!(poller.interval(), Duration::from_millis(15_000));
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        struct Answering(Cell<usize>);
        impl Fetchable for Answering {
            fn fetch(&self) -> Pending<SyncOutcome> {
                self.0.set(self.0.get() + 1);
                Pending::ready(SyncOutcome::Synced)
            }
            fn sync_status(&self) -> SyncStatus {
                SyncStatus::Synced
            }
            fn last_synced(&self) -> Option<Instant> {
                None
            }
            fn dependency_id(&self) -> DependencyId {
                DependencyId::from_url("/answering")
            }
        }

        let clock = LabClock::new();
        let scheduler = Scheduler::lab(&clock);
        let target = Rc::new(Answering(Cell::new(0)));
        let poller = PollingLiveUpdater::new(
            Rc::clone(&target) as Rc<dyn Fetchable>,
            &scheduler,
            Duration::ZERO,
        );
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);
        poller.set_interval(Duration::ZERO);
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);

        poller.start();
        scheduler.advance(Duration::from_millis(10));
        assert_eq!(target.0.get(), 11);
    }

    #[test]
    fn stop_cancels_timer() {
        let (target, poller, scheduler) = poller(100);
        poller.start();
        target.settle(SyncOutcome::Synced);
        poller.stop();
        assert!(!poller.is_armed());
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(target.fetches.get(), 1);
    }

    #[test]
    fn dispose_during_flight_stops_everything() {
        let (target, poller, scheduler) = poller(100);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        poller.on_complete(move |_| h.set(h.get() + 1));
        poller.start();
        poller.dispose();
        target.settle(SyncOutcome::Synced);
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(hits.get(), 0);
        assert_eq!(target.fetches.get(), 1);
        assert_eq!(poller.start(), UpdateTrigger::Disposed);
    }
}

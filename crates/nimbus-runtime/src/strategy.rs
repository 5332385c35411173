#![forbid(unsafe_code)]

//! Update strategies: whether a dependency is refreshed, and how often.
//!
//! A strategy is consulted each time a [`Service`](crate::Service) updates.
//! `should_update()` answers from the strategy's own state and, for
//! [`StaleAfterStrategy`], the attached target's last successful sync.
//! `interval()` never changes after construction.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use nimbus_core::{Duration, Scheduler};
use nimbus_model::Fetchable;

use crate::polling::MIN_POLL_INTERVAL;

/// Refresh policy for one dependency.
pub trait UpdateStrategy {
    /// Whether the dependency should be polled right now.
    fn should_update(&self) -> bool;

    /// Time between polls.
    fn interval(&self) -> Duration;

    /// Called with the dependency before `should_update`. Stateless
    /// strategies ignore it.
    fn attach(&self, _target: &Rc<dyn Fetchable>) {}

    /// Short policy name for logs.
    fn name(&self) -> &'static str;
}

/// Never polls. What an unbound dependency gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverUpdateStrategy;

impl UpdateStrategy for NeverUpdateStrategy {
    fn should_update(&self) -> bool {
        false
    }

    fn interval(&self) -> Duration {
        Duration::ZERO
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

/// Always polls, every `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalStrategy {
    interval: Duration,
}

impl IntervalStrategy {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        let interval = if interval.as_nanos() < MIN_POLL_INTERVAL.as_nanos() {
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        Self { interval }
    }

    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl UpdateStrategy for IntervalStrategy {
    fn should_update(&self) -> bool {
        true
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "interval"
    }
}

/// Polls while the target's data is older than `max_age`.
///
/// A target that never synced, or was never attached, counts as stale.
pub struct StaleAfterStrategy {
    max_age: Duration,
    scheduler: Scheduler,
    target: RefCell<Option<Weak<dyn Fetchable>>>,
}

impl fmt::Debug for StaleAfterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleAfterStrategy")
            .field("max_age", &self.max_age)
            .field("attached", &self.target.borrow().is_some())
            .finish()
    }
}

impl StaleAfterStrategy {
    #[must_use]
    pub fn new(max_age: Duration, scheduler: &Scheduler) -> Self {
        Self {
            max_age,
            scheduler: scheduler.clone(),
            target: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Age of the attached target's data, if it ever synced.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        let target = self.target.borrow().as_ref().and_then(Weak::upgrade)?;
        let synced = target.last_synced()?;
        Some(self.scheduler.now().saturating_duration_since(synced))
    }
}

impl UpdateStrategy for StaleAfterStrategy {
    fn should_update(&self) -> bool {
        self.age().is_none_or(|age| age >= self.max_age)
    }

    fn interval(&self) -> Duration {
        self.max_age
    }

    fn attach(&self, target: &Rc<dyn Fetchable>) {
        *self.target.borrow_mut() = Some(Rc::downgrade(target));
    }

    fn name(&self) -> &'static str {
        "stale_after"
    }
}

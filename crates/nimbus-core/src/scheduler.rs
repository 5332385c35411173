#![forbid(unsafe_code)]

//! One-shot timers driven by the host event loop.
//!
//! The [`Scheduler`] owns a queue of deferred callbacks ordered by deadline.
//! Nothing fires by itself: the host calls [`Scheduler::run_due`] from its
//! loop (or on a wake-up at [`Scheduler::next_deadline`]).
//!
//! In tests the scheduler is built over a [`LabClock`] and time is moved with
//! [`Scheduler::advance`], which steps through every deadline in between so
//! callbacks observe the clock at their own deadline.
//!
//! # Invariants
//!
//! 1. Timers fire in deadline order; equal deadlines fire in scheduling order.
//! 2. A cancelled timer never fires. Cancelling a fired or unknown timer is a
//!    no-op that returns `false`.
//! 3. A timer scheduled from inside a callback does not fire in the same
//!    `run_due` pass, even with a zero delay.
//! 4. No internal borrow is held while a callback runs; callbacks may
//!    schedule and cancel freely.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use web_time::{Duration, Instant};

/// A manually-advanceable clock for deterministic tests.
///
/// Every clone, and every [`Scheduler`] built over it, sees the same time.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset: Rc<Cell<Duration>>,
}

impl LabClock {
    /// A lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get().saturating_add(delta));
    }

    /// Move time forward to `instant`. Earlier instants are ignored.
    pub fn advance_to(&self, instant: Instant) {
        let offset = instant.saturating_duration_since(self.epoch);
        if offset > self.offset.get() {
            self.offset.set(offset);
        }
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + self.offset.get()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum TimeSource {
    Real,
    Lab(LabClock),
}

impl TimeSource {
    fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(clock) => clock.now(),
        }
    }
}

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct Queue {
    next_id: u64,
    tasks: BTreeMap<(Instant, TimerId), Task>,
    deadlines: HashMap<TimerId, Instant>,
}

impl Queue {
    /// Pop the earliest task due at `now` that was scheduled before `limit`.
    fn pop_due(&mut self, now: Instant, limit: u64) -> Option<(TimerId, Task)> {
        let key = *self
            .tasks
            .keys()
            .take_while(|(deadline, _)| *deadline <= now)
            .find(|(_, id)| id.0 < limit)?;
        self.deadlines.remove(&key.1);
        self.tasks.remove(&key).map(|task| (key.1, task))
    }
}

/// Deadline-ordered queue of one-shot callbacks.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    queue: Rc<RefCell<Queue>>,
    time: TimeSource,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("time", &self.time)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// A scheduler on wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time(TimeSource::Real)
    }

    /// A scheduler on a deterministic [`LabClock`].
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self::with_time(TimeSource::Lab(clock.clone()))
    }

    fn with_time(time: TimeSource) -> Self {
        Self {
            queue: Rc::new(RefCell::new(Queue::default())),
            time,
        }
    }

    /// Current time as this scheduler sees it.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.time.now()
    }

    /// The lab clock, when this scheduler runs on one.
    #[must_use]
    pub fn lab_clock(&self) -> Option<&LabClock> {
        match &self.time {
            TimeSource::Lab(clock) => Some(clock),
            TimeSource::Real => None,
        }
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let deadline = self.now() + delay;
        let mut queue = self.queue.borrow_mut();
        let id = TimerId(queue.next_id);
        queue.next_id += 1;
        queue.tasks.insert((deadline, id), Box::new(task));
        queue.deadlines.insert(id, deadline);
        trace!(%id, delay_ms = delay.as_millis() as u64, "timer scheduled");
        id
    }

    /// Cancel a pending timer. Returns whether it was still pending.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut queue = self.queue.borrow_mut();
        let Some(deadline) = queue.deadlines.remove(&id) else {
            return false;
        };
        // Dropped after the borrow ends; its destructor may touch the queue.
        let task = queue.tasks.remove(&(deadline, id));
        drop(queue);
        drop(task);
        trace!(%id, "timer cancelled");
        true
    }

    #[must_use]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.queue.borrow().deadlines.contains_key(&id)
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().deadlines.len()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.borrow().tasks.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Fire every timer whose deadline has passed. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let limit = self.queue.borrow().next_id;
        let mut fired = 0;
        loop {
            let now = self.now();
            let next = self.queue.borrow_mut().pop_due(now, limit);
            let Some((id, task)) = next else {
                break;
            };
            trace!(%id, "timer fired");
            task();
            fired += 1;
        }
        fired
    }

    /// Advance the lab clock by `delta`, firing timers at their deadlines.
    ///
    /// On wall-clock time this only runs what is already due.
    pub fn advance(&self, delta: Duration) -> usize {
        let Some(clock) = self.lab_clock() else {
            return self.run_due();
        };
        let target = clock.now() + delta;
        let mut fired = 0;
        while let Some(deadline) = self.next_deadline().filter(|d| *d <= target) {
            clock.advance_to(deadline);
            fired += self.run_due();
        }
        clock.advance_to(target);
        fired
    }
}

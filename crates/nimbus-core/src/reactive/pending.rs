#![forbid(unsafe_code)]

//! Single-resolution completion handles.
//!
//! A [`Pending<T>`] is the read side of an operation that finishes later on
//! the event loop; the matching [`Resolver<T>`] is the write side. Both are
//! cheap handles to one shared slot.
//!
//! # Invariants
//!
//! 1. A pending value settles at most once. Every `resolve()` after the first
//!    returns `false` and changes nothing.
//! 2. Waiters run synchronously inside the winning `resolve()`, in
//!    registration order, with no borrow held.
//! 3. A waiter registered through [`on_settled()`](Pending::on_settled) runs
//!    only while its [`Subscription`] is alive. Dropping the subscription
//!    before settlement guarantees the callback never runs.
//! 4. Registering on an already-settled handle runs the callback immediately.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Every resolver dropped unresolved | Producer bug | Handle stays pending forever; nothing fires |
//! | Late resolution | Response after timeout | `resolve()` returns `false`; waiters untouched |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::observable::Subscription;

type Once<T> = Box<dyn FnOnce(&T)>;
type GuardedSlot<T> = RefCell<Option<Once<T>>>;

enum Waiter<T> {
    Guarded(Weak<GuardedSlot<T>>),
    Detached(Once<T>),
}

struct Slot<T> {
    outcome: Option<T>,
    waiters: Vec<Waiter<T>>,
}

/// Read side of a single-resolution operation.
pub struct Pending<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

/// Write side of a single-resolution operation.
pub struct Resolver<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Pending")
            .field("outcome", &slot.outcome)
            .field("waiters", &slot.waiters.len())
            .finish()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.slot.borrow().outcome.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Pending<T> {
    /// Create an unsettled handle and its resolver.
    #[must_use]
    pub fn channel() -> (Self, Resolver<T>) {
        let slot = Rc::new(RefCell::new(Slot {
            outcome: None,
            waiters: Vec::new(),
        }));
        (
            Self {
                slot: Rc::clone(&slot),
            },
            Resolver { slot },
        )
    }

    /// Create a handle that is already settled with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (pending, resolver) = Self::channel();
        resolver.resolve(value);
        pending
    }

    /// Whether the operation has finished.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    /// The outcome, once settled.
    #[must_use]
    pub fn outcome(&self) -> Option<T> {
        self.slot.borrow().outcome.clone()
    }

    /// Run `f` on settlement while the returned guard is alive.
    #[must_use = "dropping the subscription detaches the callback"]
    pub fn on_settled(&self, f: impl FnOnce(&T) + 'static) -> Subscription {
        if let Some(value) = self.outcome() {
            f(&value);
            return Subscription::empty();
        }
        let guarded: Rc<GuardedSlot<T>> = Rc::new(RefCell::new(Some(Box::new(f))));
        self.slot
            .borrow_mut()
            .waiters
            .push(Waiter::Guarded(Rc::downgrade(&guarded)));
        Subscription::from_guard(guarded)
    }

    /// Run `f` on settlement unconditionally.
    ///
    /// Use for plumbing that must observe the outcome regardless of who is
    /// still listening downstream.
    pub fn then(&self, f: impl FnOnce(&T) + 'static) {
        if let Some(value) = self.outcome() {
            f(&value);
            return;
        }
        self.slot
            .borrow_mut()
            .waiters
            .push(Waiter::Detached(Box::new(f)));
    }

    /// Derive a handle that settles with `f(outcome)`.
    #[must_use]
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(&T) -> U + 'static) -> Pending<U> {
        let (mapped, resolver) = Pending::channel();
        self.then(move |value| {
            resolver.resolve(f(value));
        });
        mapped
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Settle the operation with `value`.
    ///
    /// Returns `false` when it was already settled; `value` is dropped.
    pub fn resolve(&self, value: T) -> bool {
        let waiters = {
            let mut slot = self.slot.borrow_mut();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(value.clone());
            std::mem::take(&mut slot.waiters)
        };
        for waiter in waiters {
            match waiter {
                Waiter::Guarded(weak) => {
                    let Some(cell) = weak.upgrade() else {
                        continue;
                    };
                    let callback = cell.borrow_mut().take();
                    if let Some(callback) = callback {
                        callback(&value);
                    }
                }
                Waiter::Detached(callback) => callback(&value),
            }
        }
        true
    }

    /// Whether some resolver already settled the operation.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_resolution_wins() {
        let (pending, resolver) = Pending::channel();
        let other = resolver.clone();
        assert!(resolver.resolve(1));
        assert!(!other.resolve(2));
        assert_eq!(pending.outcome(), Some(1));
    }

    #[test]
    fn guarded_waiter_runs_once() {
        let (pending, resolver) = Pending::<u8>::channel();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _sub = pending.on_settled(move |_| c.set(c.get() + 1));

        resolver.resolve(9);
        resolver.resolve(10);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn dropped_guard_suppresses_callback() {
        let (pending, resolver) = Pending::<u8>::channel();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        let sub = pending.on_settled(move |_| f.set(true));
        drop(sub);

        assert!(resolver.resolve(1));
        assert!(!fired.get());
    }

    #[test]
    fn settled_handle_fires_immediately() {
        let pending = Pending::ready("done");
        let seen = Rc::new(Cell::new(""));
        let s = Rc::clone(&seen);
        let sub = pending.on_settled(move |v| s.set(*v));
        assert_eq!(seen.get(), "done");
        assert!(!sub.is_active());
    }

    #[test]
    fn map_follows_source() {
        let (pending, resolver) = Pending::<u32>::channel();
        let doubled = pending.map(|v| v * 2);
        assert!(!doubled.is_settled());
        resolver.resolve(21);
        assert_eq!(doubled.outcome(), Some(42));
    }

    #[test]
    fn waiters_run_in_registration_order() {
        let (pending, resolver) = Pending::<()>::channel();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let _a = pending.on_settled(move |_| l1.borrow_mut().push(1));
        let l2 = Rc::clone(&log);
        pending.then(move |_| l2.borrow_mut().push(2));
        let l3 = Rc::clone(&log);
        let _c = pending.on_settled(move |_| l3.borrow_mut().push(3));

        resolver.resolve(());
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }
}

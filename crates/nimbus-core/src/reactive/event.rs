#![forbid(unsafe_code)]

//! Fire-and-forget event streams.
//!
//! [`EventStream<E>`] is the value-less sibling of
//! [`Observable`](super::Observable): every `emit()` reaches every live
//! subscriber, even when the same event is emitted twice in a row. Sync
//! notifications use it because two consecutive successful syncs are two
//! distinct facts even though the resulting status is unchanged.
//!
//! Ordering and teardown rules match `Observable`: registration order, and a
//! dropped [`Subscription`] never fires again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::observable::Subscription;

type Listener<E> = dyn Fn(&E);

/// A multicast stream of events of type `E`.
///
/// Cloning creates a new handle to the same listener list.
pub struct EventStream<E> {
    listeners: Rc<RefCell<Vec<Weak<Listener<E>>>>>,
}

impl<E> Clone for EventStream<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<E> Default for EventStream<E> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E: 'static> EventStream<E> {
    /// Create a stream with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for every future event.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> Subscription {
        let strong: Rc<Listener<E>> = Rc::new(listener);
        self.listeners.borrow_mut().push(Rc::downgrade(&strong));
        Subscription::from_guard(strong)
    }

    /// Deliver `event` to all live listeners in registration order.
    ///
    /// Returns the number of listeners reached.
    pub fn emit(&self, event: &E) -> usize {
        let live: Vec<Rc<Listener<E>>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|w| w.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in &live {
            listener(event);
        }
        live.len()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn repeated_events_all_delivered() {
        let stream = EventStream::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _sub = stream.subscribe(move |_: &u8| c.set(c.get() + 1));

        stream.emit(&1);
        stream.emit(&1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn emit_reports_reach() {
        let stream: EventStream<()> = EventStream::new();
        let a = stream.subscribe(|_| {});
        let _b = stream.subscribe(|_| {});
        assert_eq!(stream.emit(&()), 2);
        drop(a);
        assert_eq!(stream.emit(&()), 1);
        assert_eq!(stream.listener_count(), 1);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let stream: EventStream<u8> = EventStream::new();
        let inner_subs = Rc::new(RefCell::new(Vec::new()));
        let s = stream.clone();
        let held = Rc::clone(&inner_subs);
        let _outer = stream.subscribe(move |_| {
            held.borrow_mut().push(s.subscribe(|_| {}));
        });

        stream.emit(&0);
        assert_eq!(stream.listener_count(), 2);
    }
}

#![forbid(unsafe_code)]

//! Read bindings and subscription scopes.
//!
//! A [`Binding<T>`] is a lazily evaluated view over one or more observables:
//! presentation code reads a cell or a derived label without knowing where
//! the value lives. A [`BindingScope`] collects every [`Subscription`] owned
//! by one consumer (a service, an updater, a view) so they can be released
//! together.
//!
//! ```
//! use nimbus_core::reactive::{bind_mapped, BindingScope, Observable};
//!
//! let size = Observable::new(3usize);
//! let label = bind_mapped(&size, |n| format!("{n} instances"));
//! assert_eq!(label.get(), "3 instances");
//!
//! let mut scope = BindingScope::new();
//! scope.subscribe(&size, |n| assert!(*n > 0));
//! size.set(4);
//! assert_eq!(label.get(), "4 instances");
//! scope.clear();
//! ```
//!
//! # Invariants
//!
//! 1. `Binding::get()` always evaluates against the current source values.
//! 2. A binding's transform runs on every `get()` (no caching).
//! 3. After a scope is dropped or cleared, none of its callbacks fire.
//! 4. `binding_count()` equals the number of held subscriptions.

use std::fmt;
use std::rc::Rc;

use super::event::EventStream;
use super::observable::{Observable, Subscription};

/// A read-only view evaluated on demand.
pub struct Binding<T> {
    eval: Rc<dyn Fn() -> T>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            eval: Rc::clone(&self.eval),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("value", &self.get())
            .finish()
    }
}

impl<T: 'static> Binding<T> {
    /// Create a binding that evaluates `f` on each `get()` call.
    pub fn new(f: impl Fn() -> T + 'static) -> Self {
        Self { eval: Rc::new(f) }
    }

    /// Evaluate the binding.
    #[must_use]
    pub fn get(&self) -> T {
        (self.eval)()
    }

    /// Chain a further transform.
    pub fn then<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Binding<U> {
        Binding {
            eval: Rc::new(move || f((self.eval)())),
        }
    }
}

/// Bind directly to an observable's value.
pub fn bind_observable<T: Clone + PartialEq + 'static>(source: &Observable<T>) -> Binding<T> {
    let src = source.clone();
    Binding::new(move || src.get())
}

/// Bind to `map(source)`.
pub fn bind_mapped<S: Clone + PartialEq + 'static, T: 'static>(
    source: &Observable<S>,
    map: impl Fn(&S) -> T + 'static,
) -> Binding<T> {
    let src = source.clone();
    Binding::new(move || src.with(|v| map(v)))
}

/// Owner of a group of subscriptions.
///
/// Subscriptions are released in reverse registration order on drop.
#[derive(Default)]
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is cleared or dropped.
    pub fn hold(&mut self, sub: Subscription) -> &mut Self {
        self.subscriptions.push(sub);
        self
    }

    /// Subscribe to an observable for the lifetime of the scope.
    pub fn subscribe<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let sub = source.subscribe(callback);
        self.hold(sub)
    }

    /// Listen to an event stream for the lifetime of the scope.
    pub fn listen<E: 'static>(
        &mut self,
        stream: &EventStream<E>,
        listener: impl Fn(&E) + 'static,
    ) -> &mut Self {
        let sub = stream.subscribe(listener);
        self.hold(sub)
    }

    /// Number of held subscriptions.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every held subscription now.
    pub fn clear(&mut self) {
        while let Some(sub) = self.subscriptions.pop() {
            drop(sub);
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn binding_tracks_source() {
        let obs = Observable::new(10);
        let b = bind_observable(&obs);
        obs.set(11);
        assert_eq!(b.get(), 11);
    }

    #[test]
    fn mapped_binding_chain() {
        let status = Observable::new("pending");
        let label = bind_mapped(&status, |s| s.to_uppercase()).then(|s| format!("[{s}]"));
        assert_eq!(label.get(), "[PENDING]");
        status.set("ready");
        assert_eq!(label.get(), "[READY]");
    }

    #[test]
    fn scope_clear_detaches_everything() {
        let obs = Observable::new(0);
        let events = EventStream::<u8>::new();
        let hits = Rc::new(Cell::new(0));

        let mut scope = BindingScope::new();
        let h1 = Rc::clone(&hits);
        scope.subscribe(&obs, move |_| h1.set(h1.get() + 1));
        let h2 = Rc::clone(&hits);
        scope.listen(&events, move |_| h2.set(h2.get() + 1));
        assert_eq!(scope.binding_count(), 2);

        obs.set(1);
        events.emit(&0);
        assert_eq!(hits.get(), 2);

        scope.clear();
        assert!(scope.is_empty());
        obs.set(2);
        events.emit(&0);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn scope_drop_detaches() {
        let obs = Observable::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let mut scope = BindingScope::new();
            let s = Rc::clone(&seen);
            scope.subscribe(&obs, move |v| s.borrow_mut().push(*v));
            obs.set(1);
        }
        obs.set(2);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn scope_debug_reports_count() {
        let mut scope = BindingScope::new();
        scope.hold(Subscription::empty());
        assert!(format!("{scope:?}").contains("binding_count: 1"));
    }
}

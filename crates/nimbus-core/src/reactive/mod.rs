#![forbid(unsafe_code)]

//! Reactive primitives for the Nimbus data layer.
//!
//! - [`Observable`]: a shared, version-tracked value with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`EventStream`]: multicast notifications without a stored value.
//! - [`Pending`] / [`Resolver`]: a single-resolution completion handle.
//! - [`Binding`] / [`BindingScope`]: derived reads and grouped teardown.
//!
//! # Architecture
//!
//! Everything here is single-threaded: `Rc<RefCell<..>>` storage, `Weak`
//! callbacks, `!Send` handles. Work that completes later is delivered by
//! whoever holds the [`Resolver`], on the same thread, from the host event
//! loop.
//!
//! # Invariants
//!
//! 1. Notifications are synchronous and run in registration order.
//! 2. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 3. No internal borrow is held while user callbacks run.

pub mod binding;
pub mod event;
pub mod observable;
pub mod pending;

pub use binding::{Binding, BindingScope, bind_mapped, bind_observable};
pub use event::EventStream;
pub use observable::{Observable, Subscription};
pub use pending::{Pending, Resolver};

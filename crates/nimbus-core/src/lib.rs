#![forbid(unsafe_code)]

//! Core building blocks for the Nimbus data layer.
//!
//! This crate provides:
//! - [`reactive`]: observables, subscriptions, event streams, and
//!   single-resolution [`Pending`] completions
//! - [`TypedCell`] and [`GroupingCell`]: type-guarded observable fields
//! - [`Value`] / [`FieldType`] and the JSON [`wire`] codec
//! - [`Scheduler`] with a deterministic [`LabClock`] for tests
//! - [`DependencyId`] for keying refreshable dependencies

pub mod cell;
pub mod error;
pub mod grouping;
pub mod id;
pub mod reactive;
pub mod scheduler;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;
pub mod wire;

pub use cell::{CellValue, Guard, TypedCell};
pub use error::{CellError, WireError};
pub use grouping::{ContainerKind, GroupingCell};
pub use id::DependencyId;
pub use reactive::{
    Binding, BindingScope, EventStream, Observable, Pending, Resolver, Subscription,
};
pub use scheduler::{LabClock, Scheduler, TimerId};
pub use value::{FieldType, FileBlob, Value};

pub use web_time::{Duration, Instant};

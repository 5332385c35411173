#![forbid(unsafe_code)]

//! Nimbus public facade.
//!
//! Typed reactive models backed by HTTP stores, kept fresh by live updaters
//! whose cadence is chosen per dependency.
//!
//! ```
//! use nimbus::prelude::*;
//!
//! let schema = Schema::builder("vm")
//!     .field(FieldSpec::new("id", FieldType::String))
//!     .field(FieldSpec::new("cpus", FieldType::Number).required().default_value(1))
//!     .build()
//!     .unwrap();
//! let vm = Model::new(&schema).unwrap();
//! vm.parse(&serde_json::json!({"id": "vm-1", "cpus": 4})).unwrap();
//! assert_eq!(vm.id().as_deref(), Some("vm-1"));
//! assert!(vm.set("cpus", "four").is_err());
//! assert_eq!(vm.get("cpus").unwrap(), Value::from(4));
//! ```
//!
//! # Crates
//!
//! - [`nimbus_core`]: cells, values, reactive primitives, the scheduler
//! - [`nimbus_model`]: schemas, models, collections, stores, transports
//! - [`nimbus_runtime`] (feature `runtime`): updaters, strategies, services

pub use nimbus_core;
pub use nimbus_model;
#[cfg(feature = "runtime")]
pub use nimbus_runtime;

pub use nimbus_core::{
    CellError, DependencyId, Duration, FieldType, Guard, Instant, LabClock, Pending, Scheduler,
    Subscription, TypedCell, Value,
};
pub use nimbus_model::{
    Collection, Endpoint, Fetchable, FieldSpec, HttpStore, Model, ModelError, Schema, Store,
    SyncError, SyncOutcome, SyncStatus, Transport,
};
#[cfg(feature = "runtime")]
pub use nimbus_runtime::{
    DependencyService, FetchingLiveUpdater, LiveUpdater, PollingLiveUpdater, RuntimeContext,
    Service, ServiceError, StrategyRegistry, SyncConfig, UpdateStrategy,
};

/// Everything most applications import.
pub mod prelude {
    pub use nimbus_core::{
        DependencyId, Duration, FieldType, GroupingCell, Guard, Pending, Scheduler, Subscription,
        TypedCell, Value,
    };
    pub use nimbus_model::{
        Collection, Endpoint, Fetchable, FieldSpec, HttpStore, Model, Schema, Store, SyncOutcome,
        SyncStatus, Transport,
    };
    #[cfg(feature = "runtime")]
    pub use nimbus_runtime::{
        DependencyService, IntervalStrategy, LiveUpdater, NeverUpdateStrategy, PollingLiveUpdater,
        RuntimeContext, Service, StaleAfterStrategy, UpdateStrategy,
    };
}

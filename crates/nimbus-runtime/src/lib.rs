#![forbid(unsafe_code)]

//! Freshness scheduling for Nimbus models and collections.
//!
//! This crate provides:
//! - [`LiveUpdater`] with [`FetchingLiveUpdater`] (one cycle at a time) and
//!   [`PollingLiveUpdater`] (eager first fetch, then interval polling)
//! - [`UpdateStrategy`] policies and the [`StrategyRegistry`] that binds
//!   them to dependencies
//! - [`RuntimeContext`]: registry, scheduler, and [`SyncConfig`] shared by
//!   the services of one application
//! - [`Service`] / [`DependencyService`]: the only surface presentation code
//!   needs
//!
//! # Feature Flags
//!
//! - `policy-config`: load [`SyncConfig`] from TOML
//! - `tracing-json`: [`logging::init`] installs a JSON or plain subscriber

pub mod config;
pub mod context;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod polling;
pub mod registry;
pub mod service;
pub mod strategy;
pub mod updater;

pub use config::{ConfigError, StrategyConfig, StrategyPolicy, SyncConfig};
pub use context::RuntimeContext;
pub use polling::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, PollingLiveUpdater};
pub use registry::StrategyRegistry;
pub use service::{Dependency, DependencyService, Service, ServiceError};
pub use strategy::{IntervalStrategy, NeverUpdateStrategy, StaleAfterStrategy, UpdateStrategy};
pub use updater::{FetchingLiveUpdater, LiveUpdater, UpdateTrigger, UpdaterState};

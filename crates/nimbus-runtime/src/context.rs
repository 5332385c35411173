#![forbid(unsafe_code)]

//! Explicit runtime context: the registry, the scheduler, and the config
//! a group of services share.

use std::rc::Rc;

use nimbus_core::{DependencyId, Scheduler};
use nimbus_model::{HttpStore, StoreBuilder, Transport};
use tracing::debug;

use crate::config::{StrategyPolicy, SyncConfig};
use crate::registry::StrategyRegistry;
use crate::strategy::{IntervalStrategy, NeverUpdateStrategy, StaleAfterStrategy, UpdateStrategy};

/// Shared state for the services of one application.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    registry: Rc<StrategyRegistry>,
    scheduler: Scheduler,
    config: Rc<SyncConfig>,
}

impl RuntimeContext {
    /// An empty context with the default config.
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            registry: Rc::new(StrategyRegistry::new()),
            scheduler: scheduler.clone(),
            config: Rc::new(SyncConfig::default()),
        }
    }

    /// A context whose registry holds every strategy `config` names.
    #[must_use]
    pub fn from_config(config: SyncConfig, scheduler: &Scheduler) -> Self {
        let registry = StrategyRegistry::new();
        for entry in &config.strategies {
            let url = config.dependency_url(&entry.dependency);
            let interval = config.interval_for(entry);
            let strategy: Rc<dyn UpdateStrategy> = match entry.policy {
                StrategyPolicy::Never => Rc::new(NeverUpdateStrategy),
                StrategyPolicy::Interval => Rc::new(IntervalStrategy::new(interval)),
                StrategyPolicy::StaleAfter => Rc::new(StaleAfterStrategy::new(interval, scheduler)),
            };
            debug!(%url, policy = strategy.name(), interval_ms = interval.as_millis() as u64, "strategy configured");
            registry.update_with_strategy(DependencyId::from_url(url), strategy);
        }
        Self {
            registry: Rc::new(registry),
            scheduler: scheduler.clone(),
            config: Rc::new(config),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bind `strategy` to the resource at `url`.
    pub fn bind_url(&self, url: impl Into<String>, strategy: impl UpdateStrategy + 'static) {
        self.registry
            .update_with_strategy(DependencyId::from_url(url), Rc::new(strategy));
    }

    /// A store builder for `resource` under the configured proxy path,
    /// with the configured fetch timeout.
    pub fn store_builder(&self, resource: &str, transport: Rc<dyn Transport>) -> StoreBuilder {
        HttpStore::builder(self.config.endpoint(resource), transport, &self.scheduler)
            .timeout(self.config.fetch_timeout())
    }
}

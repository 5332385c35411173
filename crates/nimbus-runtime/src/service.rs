#![forbid(unsafe_code)]

//! The consumer-facing service capability.
//!
//! A [`Service`] exposes its dependencies and one `update()` entry point.
//! Presentation code depends on nothing else: stores, updaters, and the
//! strategy registry stay behind it.
//!
//! # Update rules
//!
//! For each registered dependency, [`DependencyService::update`] resolves
//! the strategy bound to its [`DependencyId`] and then:
//!
//! | `should_update()` | Action |
//! |-------------------|--------|
//! | `true` | start the dependency's [`PollingLiveUpdater`] at the strategy's interval |
//! | `false` | stop the poller; if the dependency never synced, run one fetch cycle |
//!
//! Both paths go through the poller's single
//! [`FetchingLiveUpdater`](crate::updater::FetchingLiveUpdater), so a
//! dependency never has two fetches in flight, whichever way its strategy
//! changes between updates. Strategies are resolved by the dependency's
//! current key, which may differ from the key it was registered under once
//! a model learns its id.
//!
//! # Status
//!
//! `is_loaded` holds when every dependency's last completed sync succeeded.
//! `is_error` / `is_timeout` hold when any dependency's last completed sync
//! failed / timed out. A service with no dependencies is loaded.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use nimbus_core::{BindingScope, DependencyId, EventStream};
use nimbus_model::{Collection, Fetchable, Model, SyncEvent, SyncStatus};
use tracing::{debug, trace};

use crate::context::RuntimeContext;
use crate::polling::PollingLiveUpdater;
use crate::strategy::UpdateStrategy;
use crate::updater::LiveUpdater;

/// A model or collection a service relies on.
#[derive(Debug, Clone)]
pub enum Dependency {
    Model(Model),
    Collection(Collection),
}

impl Dependency {
    #[must_use]
    pub fn key(&self) -> DependencyId {
        match self {
            Self::Model(model) => model.key(),
            Self::Collection(collection) => collection.key(),
        }
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        match self {
            Self::Model(model) => model.status(),
            Self::Collection(collection) => collection.status(),
        }
    }

    #[must_use]
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            Self::Collection(_) => None,
        }
    }

    #[must_use]
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            Self::Model(_) => None,
        }
    }

    /// Sync lifecycle notifications of the dependency.
    #[must_use]
    pub fn events(&self) -> &EventStream<SyncEvent> {
        match self {
            Self::Model(model) => model.events(),
            Self::Collection(collection) => collection.events(),
        }
    }

    /// Whether both refer to the same model or collection.
    #[must_use]
    pub fn same_as(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Self::Model(a), Self::Model(b)) => a.same_as(b),
            (Self::Collection(a), Self::Collection(b)) => a.same_as(b),
            _ => false,
        }
    }

    fn fetchable(&self) -> Rc<dyn Fetchable> {
        match self {
            Self::Model(model) => Rc::new(model.clone()),
            Self::Collection(collection) => Rc::new(collection.clone()),
        }
    }
}

impl From<Model> for Dependency {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<Collection> for Dependency {
    fn from(collection: Collection) -> Self {
        Self::Collection(collection)
    }
}

/// Errors raised by [`DependencyService::register`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("another dependency is already registered as {0}")]
    DuplicateKey(DependencyId),
    #[error("service is disposed")]
    Disposed,
}

/// What presentation code may depend on.
pub trait Service {
    fn dependency(&self, key: &DependencyId) -> Option<Dependency>;

    /// Apply each dependency's refresh strategy.
    fn update(&self);

    fn is_loaded(&self) -> bool;

    fn is_error(&self) -> bool;

    fn is_timeout(&self) -> bool;
}

struct Entry {
    dependency: Dependency,
    target: Rc<dyn Fetchable>,
    poller: PollingLiveUpdater,
    watch: BindingScope,
}

/// A [`Service`] over registered models and collections.
pub struct DependencyService {
    context: RuntimeContext,
    entries: RefCell<IndexMap<DependencyId, Entry>>,
    disposed: Cell<bool>,
}

impl fmt::Debug for DependencyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_struct("DependencyService")
            .field("dependencies", &entries.keys().collect::<Vec<_>>())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

impl DependencyService {
    #[must_use]
    pub fn new(context: &RuntimeContext) -> Self {
        Self {
            context: context.clone(),
            entries: RefCell::new(IndexMap::new()),
            disposed: Cell::new(false),
        }
    }

    #[must_use]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    /// Add a dependency, returning its key.
    ///
    /// Registering the same handle again is a no-op. A different dependency
    /// under a key that is already taken is rejected; [`unregister`] the old
    /// one first to replace it.
    ///
    /// [`unregister`]: DependencyService::unregister
    pub fn register(
        &self,
        dependency: impl Into<Dependency>,
    ) -> Result<DependencyId, ServiceError> {
        if self.disposed.get() {
            return Err(ServiceError::Disposed);
        }
        let dependency = dependency.into();
        let key = dependency.key();
        if let Some(existing) = self.entries.borrow().get(&key) {
            if existing.dependency.same_as(&dependency) {
                return Ok(key);
            }
            debug!(%key, "dependency key collision");
            return Err(ServiceError::DuplicateKey(key));
        }
        let target = dependency.fetchable();
        let mut watch = BindingScope::new();
        let traced = key.clone();
        watch.listen(dependency.events(), move |event| {
            trace!(key = %traced, ?event, "dependency sync event");
        });
        let poller = PollingLiveUpdater::new(
            Rc::clone(&target),
            self.context.scheduler(),
            self.context.config().poll_interval(),
        );
        let entry = Entry {
            dependency,
            target,
            poller,
            watch,
        };
        self.entries.borrow_mut().insert(key.clone(), entry);
        debug!(%key, "dependency registered");
        Ok(key)
    }

    /// Remove a dependency and tear down its updaters.
    pub fn unregister(&self, key: &DependencyId) -> Option<Dependency> {
        let mut entry = self.entries.borrow_mut().shift_remove(key)?;
        Self::teardown(&mut entry);
        debug!(%key, "dependency unregistered");
        Some(entry.dependency)
    }

    #[must_use]
    pub fn status(&self, key: &DependencyId) -> Option<SyncStatus> {
        self.entries.borrow().get(key).map(|e| e.target.sync_status())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<DependencyId> {
        self.entries.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether a poller is currently running for `key`.
    #[must_use]
    pub fn is_polling(&self, key: &DependencyId) -> bool {
        self.entries
            .borrow()
            .get(key)
            .is_some_and(|e| e.poller.is_running())
    }

    /// Stop and detach every updater. Later calls to `update` do nothing.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let mut entries = std::mem::take(&mut *self.entries.borrow_mut());
        for entry in entries.values_mut() {
            Self::teardown(entry);
        }
        debug!(count = entries.len(), "service disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn teardown(entry: &mut Entry) {
        entry.watch.clear();
        entry.poller.dispose();
    }

    fn update_one(&self, key: &DependencyId) {
        let (target, poller) = {
            let entries = self.entries.borrow();
            let Some(entry) = entries.get(key) else {
                return;
            };
            (Rc::clone(&entry.target), entry.poller.clone())
        };
        let strategy = self.context.registry().get_strategy(&target.dependency_id());
        strategy.attach(&target);

        if strategy.should_update() {
            let interval = strategy.interval();
            if poller.interval() != interval {
                poller.set_interval(interval);
            }
            if !poller.is_running() {
                trace!(%key, policy = strategy.name(), "starting poller");
                poller.start();
            }
        } else {
            if poller.is_running() {
                trace!(%key, "stopping poller");
                poller.stop();
            }
            if target.last_synced().is_none() {
                poller.fetcher().update();
            }
        }
    }

    fn any_status(&self, status: SyncStatus) -> bool {
        self.entries
            .borrow()
            .values()
            .any(|e| e.target.sync_status() == status)
    }
}

impl Service for DependencyService {
    fn dependency(&self, key: &DependencyId) -> Option<Dependency> {
        self.entries.borrow().get(key).map(|e| e.dependency.clone())
    }

    fn update(&self) {
        if self.disposed.get() {
            return;
        }
        // Updaters may complete synchronously and re-enter; iterate a snapshot.
        for key in self.keys() {
            self.update_one(&key);
        }
    }

    fn is_loaded(&self) -> bool {
        self.entries
            .borrow()
            .values()
            .all(|e| e.target.sync_status() == SyncStatus::Synced)
    }

    fn is_error(&self) -> bool {
        self.any_status(SyncStatus::Failed)
    }

    fn is_timeout(&self) -> bool {
        self.any_status(SyncStatus::TimedOut)
    }
}

impl Drop for DependencyService {
    fn drop(&mut self) {
        self.dispose();
    }
}

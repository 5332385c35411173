#![forbid(unsafe_code)]

//! Ordered sets of same-schema models.
//!
//! # Invariants
//!
//! 1. Every member was built from the collection's schema and had all its
//!    required fields filled when it was inserted.
//! 2. No two members share an id.
//! 3. After [`Collection::reconcile`] the members are exactly the listed
//!    entries, in server order. Members whose id is still listed keep their
//!    handle and are updated in place.
//! 4. Removing a member never touches its cells.
//! 5. A reconcile that fails leaves membership and every member untouched.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use nimbus_core::wire::{decode, json_kind};
use nimbus_core::{CellError, DependencyId, EventStream, Instant, Pending, Subscription};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::{ModelError, SyncError};
use crate::model::Model;
use crate::schema::Schema;
use crate::store::{Store, StoreReply};
use crate::sync::{Fetchable, SyncEvent, SyncOutcome, SyncStatus, SyncTracker};

/// Membership changes.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Added { index: usize, model: Model },
    Removed { index: usize, model: Model },
    /// Membership was replaced from a server listing.
    Reset,
}

struct CollectionInner {
    schema: Rc<Schema>,
    models: RefCell<Vec<Model>>,
    key: RefCell<DependencyId>,
    pinned: Cell<bool>,
    store: RefCell<Option<Rc<dyn Store>>>,
    items_key: RefCell<Option<String>>,
    sync: SyncTracker,
    events: EventStream<CollectionEvent>,
}

/// A resource listing. Cloning yields another handle to the same collection.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("schema", &self.inner.schema.name())
            .field("len", &self.len())
            .field("key", &self.key())
            .finish()
    }
}

impl Collection {
    #[must_use]
    pub fn new(schema: &Rc<Schema>) -> Self {
        Self {
            inner: Rc::new(CollectionInner {
                schema: Rc::clone(schema),
                models: RefCell::new(Vec::new()),
                key: RefCell::new(DependencyId::generate()),
                pinned: Cell::new(false),
                store: RefCell::new(None),
                items_key: RefCell::new(None),
                sync: SyncTracker::default(),
                events: EventStream::new(),
            }),
        }
    }

    /// Attach a store. The collection is keyed by its listing URL from now
    /// on, unless its key was pinned with [`with_key`](Self::with_key).
    #[must_use]
    pub fn with_store(self, store: Rc<dyn Store>) -> Self {
        if !self.inner.pinned.get() {
            *self.inner.key.borrow_mut() = DependencyId::from_url(store.url(None));
        }
        *self.inner.store.borrow_mut() = Some(store);
        self
    }

    /// Read the listing from `body[key]` instead of the body itself.
    #[must_use]
    pub fn with_items_key(self, key: impl Into<String>) -> Self {
        *self.inner.items_key.borrow_mut() = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_key(self, key: DependencyId) -> Self {
        *self.inner.key.borrow_mut() = key;
        self.inner.pinned.set(true);
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    #[must_use]
    pub fn store(&self) -> Option<Rc<dyn Store>> {
        self.inner.store.borrow().clone()
    }

    #[must_use]
    pub fn key(&self) -> DependencyId {
        self.inner.key.borrow().clone()
    }

    /// Whether two handles refer to the same collection.
    #[must_use]
    pub fn same_as(&self, other: &Collection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.models.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the members, in order.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.inner.models.borrow().clone()
    }

    /// Borrow the members for the duration of `f`.
    ///
    /// `f` must not add or remove members.
    pub fn with_models<R>(&self, f: impl FnOnce(&[Model]) -> R) -> R {
        f(&self.inner.models.borrow())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Model> {
        self.position(id).map(|i| self.inner.models.borrow()[i].clone())
    }

    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<Model> {
        self.inner.models.borrow().get(index).cloned()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.inner
            .models
            .borrow()
            .iter()
            .position(|m| m.id().as_deref() == Some(id))
    }

    /// Append a well-formed model of this collection's schema.
    pub fn add(&self, model: Model) -> Result<(), ModelError> {
        self.admit(&model)?;
        if let Some(id) = model.id() {
            if self.position(&id).is_some() {
                return Err(ModelError::DuplicateId(id));
            }
        }
        self.attach_store(&model);
        let index = {
            let mut models = self.inner.models.borrow_mut();
            models.push(model.clone());
            models.len() - 1
        };
        self.inner.events.emit(&CollectionEvent::Added { index, model });
        Ok(())
    }

    /// Build a model from a payload and append it.
    pub fn add_wire(&self, wire: &Json) -> Result<Model, ModelError> {
        let model = Model::from_wire(&self.inner.schema, wire)?;
        self.add(model.clone())?;
        Ok(model)
    }

    /// Remove the member with `id`.
    pub fn remove(&self, id: &str) -> Option<Model> {
        self.remove_at(self.position(id)?)
    }

    pub fn remove_at(&self, index: usize) -> Option<Model> {
        let model = {
            let mut models = self.inner.models.borrow_mut();
            (index < models.len()).then(|| models.remove(index))?
        };
        self.inner.events.emit(&CollectionEvent::Removed {
            index,
            model: model.clone(),
        });
        Some(model)
    }

    /// Serialize every member, in order.
    #[must_use]
    pub fn to_wire(&self) -> Json {
        Json::Array(self.with_models(|models| models.iter().map(Model::to_wire).collect()))
    }

    /// Make membership match a server listing.
    pub fn reconcile(&self, items: &[Json]) -> Result<(), ModelError> {
        let current = self.models();
        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(items.len());
        let mut updates = Vec::new();
        let mut created = Vec::new();

        for item in items {
            let id = self.listed_id(item)?;
            if !seen.insert(id.clone()) {
                return Err(ModelError::DuplicateId(id));
            }
            match current.iter().find(|m| m.id().as_deref() == Some(id.as_str())) {
                Some(existing) => {
                    existing.check(item)?;
                    updates.push((existing.clone(), item));
                    next.push(existing.clone());
                }
                None => {
                    let model = Model::from_wire(&self.inner.schema, item)?;
                    self.admit(&model)?;
                    created.push(model.clone());
                    next.push(model);
                }
            }
        }

        for (model, item) in updates {
            model.parse(item)?;
        }
        for model in &created {
            self.attach_store(model);
        }
        let removed: Vec<(usize, Model)> = current
            .iter()
            .enumerate()
            .filter(|(_, m)| !next.iter().any(|n| n.same_as(m)))
            .map(|(i, m)| (i, m.clone()))
            .collect();
        let added: Vec<(usize, Model)> = next
            .iter()
            .enumerate()
            .filter(|(_, m)| created.iter().any(|c| c.same_as(m)))
            .map(|(i, m)| (i, m.clone()))
            .collect();

        *self.inner.models.borrow_mut() = next;
        debug!(
            schema = self.inner.schema.name(),
            added = added.len(),
            removed = removed.len(),
            "collection reconciled"
        );
        for (index, model) in removed {
            self.inner.events.emit(&CollectionEvent::Removed { index, model });
        }
        for (index, model) in added {
            self.inner.events.emit(&CollectionEvent::Added { index, model });
        }
        self.inner.events.emit(&CollectionEvent::Reset);
        Ok(())
    }

    /// Observe membership changes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&CollectionEvent) + 'static) -> Subscription {
        self.inner.events.subscribe(listener)
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.sync.status()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.sync.is_syncing()
    }

    #[must_use]
    pub fn events(&self) -> &EventStream<SyncEvent> {
        self.inner.sync.events()
    }

    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.store().map(|store| store.url(None))
    }

    /// Reload the listing from the store.
    pub fn fetch(&self) -> Pending<SyncOutcome> {
        let sync = self.inner.sync.clone();
        sync.begin();
        let Some(store) = self.store() else {
            let outcome = SyncOutcome::Failed(SyncError::NoStore);
            sync.finish(&outcome, Instant::now());
            return Pending::ready(outcome);
        };
        let collection = self.clone();
        store.fetch(None).map(move |reply| {
            let outcome = collection.apply(reply);
            debug!(schema = collection.inner.schema.name(), ?outcome, "collection sync settled");
            collection.inner.sync.finish(&outcome, store.now());
            outcome
        })
    }

    fn apply(&self, reply: &StoreReply) -> SyncOutcome {
        match reply {
            StoreReply::Body(body) => match self.listing(body).and_then(|items| self.reconcile(items)) {
                Ok(()) => SyncOutcome::Synced,
                Err(err) => SyncOutcome::Failed(SyncError::Malformed(err.to_string())),
            },
            StoreReply::TimedOut => SyncOutcome::TimedOut,
            StoreReply::Failed(err) => SyncOutcome::Failed(err.clone()),
        }
    }

    fn listing<'a>(&self, body: &'a Json) -> Result<&'a [Json], ModelError> {
        let items_key = self.inner.items_key.borrow();
        let list = match items_key.as_deref() {
            Some(key) => body.get(key),
            None => Some(body),
        };
        match list {
            Some(Json::Array(items)) => Ok(items),
            other => Err(ModelError::Malformed(format!(
                "expected a listing array, found {}",
                other.map_or("nothing", json_kind)
            ))),
        }
    }

    fn listed_id(&self, item: &Json) -> Result<String, ModelError> {
        let schema = &self.inner.schema;
        let attr = schema.id_attribute();
        let missing = || ModelError::MissingId(attr.to_owned());
        let spec = schema.field(attr).ok_or_else(missing)?;
        let mut node = item;
        for key in spec.path() {
            node = node.get(key).ok_or_else(missing)?;
        }
        let value = decode(&spec.field_type, node).map_err(|source| ModelError::Wire {
            field: attr.to_owned(),
            source,
        })?;
        value.to_key().ok_or_else(missing)
    }

    fn admit(&self, model: &Model) -> Result<(), ModelError> {
        if !Rc::ptr_eq(model.schema(), &self.inner.schema) {
            return Err(ModelError::SchemaMismatch {
                expected: self.inner.schema.name().to_owned(),
                found: model.schema().name().to_owned(),
            });
        }
        if let Some(field) = model.missing_required() {
            return Err(CellError::NullViolation {
                cell: field.to_owned(),
            }
            .into());
        }
        Ok(())
    }

    fn attach_store(&self, model: &Model) {
        if model.store().is_some() {
            return;
        }
        if let Some(store) = self.store() {
            model.set_store(store);
        }
    }
}

impl Fetchable for Collection {
    fn fetch(&self) -> Pending<SyncOutcome> {
        Collection::fetch(self)
    }

    fn sync_status(&self) -> SyncStatus {
        self.status()
    }

    fn last_synced(&self) -> Option<Instant> {
        self.inner.sync.last_synced()
    }

    fn dependency_id(&self) -> DependencyId {
        self.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use nimbus_core::testing::CallLog;
    use nimbus_core::{FieldType, Value};
    use serde_json::json;

    fn schema() -> Rc<Schema> {
        Schema::builder("volume")
            .field(FieldSpec::new("id", FieldType::Number).required())
            .field(FieldSpec::new("size", FieldType::Number).required().default_value(1))
            .field(FieldSpec::new("name", FieldType::String))
            .build()
            .unwrap()
    }

    fn ids(c: &Collection) -> Vec<String> {
        c.with_models(|models| models.iter().filter_map(Model::id).collect())
    }

    #[test]
    fn add_requires_well_formed_models() {
        let volumes = Collection::new(&schema());
        let blank = Model::new(volumes.schema()).unwrap();
        let err = volumes.add(blank).unwrap_err();
        assert_eq!(err, ModelError::Cell(CellError::NullViolation { cell: "id".into() }));
        assert!(volumes.is_empty());
    }

    #[test]
    fn add_rejects_foreign_schema_and_duplicates() {
        let volumes = Collection::new(&schema());
        let other = Model::from_wire(&schema(), &json!({"id": 1})).unwrap();
        assert!(matches!(volumes.add(other), Err(ModelError::SchemaMismatch { .. })));

        volumes.add_wire(&json!({"id": 1})).unwrap();
        assert_eq!(
            volumes.add_wire(&json!({"id": 1})).unwrap_err(),
            ModelError::DuplicateId("1".into())
        );
    }

    #[test]
    fn removal_leaves_model_intact() {
        let volumes = Collection::new(&schema());
        volumes.add_wire(&json!({"id": 1, "size": 20, "name": "data"})).unwrap();
        let removed = volumes.remove("1").unwrap();
        assert!(volumes.is_empty());
        assert_eq!(removed.get("size").unwrap(), Value::from(20));
        assert_eq!(removed.get("name").unwrap(), Value::from("data"));
        assert!(volumes.remove("1").is_none());
        assert!(volumes.remove_at(0).is_none());
    }

    #[test]
    fn reconcile_follows_server_order_and_updates_in_place() {
        let volumes = Collection::new(&schema());
        volumes
            .reconcile(&[json!({"id": 1, "size": 10}), json!({"id": 2, "size": 20})])
            .unwrap();
        let second = volumes.get("2").unwrap();

        volumes
            .reconcile(&[json!({"id": 3}), json!({"id": 2, "size": 25})])
            .unwrap();
        assert_eq!(ids(&volumes), ["3", "2"]);
        assert!(volumes.get("2").unwrap().same_as(&second));
        assert_eq!(second.get("size").unwrap(), Value::from(25));
    }

    #[test]
    fn failed_reconcile_changes_nothing() {
        let volumes = Collection::new(&schema());
        volumes.reconcile(&[json!({"id": 1, "size": 10})]).unwrap();
        let err = volumes
            .reconcile(&[json!({"id": 1, "size": 11}), json!({"id": 2, "size": "big"})])
            .unwrap_err();
        assert!(matches!(err, ModelError::Wire { .. }));
        assert_eq!(ids(&volumes), ["1"]);
        assert_eq!(volumes.get("1").unwrap().get("size").unwrap(), Value::from(10));

        assert!(matches!(
            volumes.reconcile(&[json!({"size": 3})]),
            Err(ModelError::MissingId(_))
        ));
        assert!(matches!(
            volumes.reconcile(&[json!({"id": 4}), json!({"id": 4})]),
            Err(ModelError::DuplicateId(_))
        ));
        assert_eq!(ids(&volumes), ["1"]);
    }

    #[test]
    fn events_report_membership_changes() {
        let volumes = Collection::new(&schema());
        let log = CallLog::new();
        let _sub = volumes.subscribe(log.recorder(|e: &CollectionEvent| match e {
            CollectionEvent::Added { index, model } => format!("+{index}:{}", model.id().unwrap_or_default()),
            CollectionEvent::Removed { index, model } => format!("-{index}:{}", model.id().unwrap_or_default()),
            CollectionEvent::Reset => "reset".to_owned(),
        }));

        volumes.add_wire(&json!({"id": 1})).unwrap();
        volumes.reconcile(&[json!({"id": 2}), json!({"id": 1})]).unwrap();
        assert_eq!(log.entries(), ["+0:1", "+0:2", "reset"]);
    }

    #[test]
    fn to_wire_is_ordered() {
        let volumes = Collection::new(&schema());
        volumes.add_wire(&json!({"id": 2, "size": 5, "name": null})).unwrap();
        volumes.add_wire(&json!({"id": 1, "size": 6, "name": "b"})).unwrap();
        assert_eq!(
            volumes.to_wire(),
            json!([{"id": 2, "size": 5, "name": null}, {"id": 1, "size": 6, "name": "b"}])
        );
    }
}

#![forbid(unsafe_code)]

//! Schema-driven observable models.
//!
//! A [`Model`] is one server-side resource instance: an ordered set of
//! cells built from a shared [`Schema`], an optional [`Store`], and the
//! sync bookkeeping a live updater watches.
//!
//! # Invariants
//!
//! 1. A model owns its cells; they are never shared with another model.
//! 2. `set` surfaces cell errors unchanged and never partially applies.
//! 3. `parse` is atomic: every present field is decoded and validated
//!    before any cell is written. Fields absent from the payload are left
//!    as they are.
//! 4. `to_wire` writes every field at its wire path.
//!
//! # Example
//!
//! ```
//! use nimbus_model::{FieldSpec, Model, Schema};
//! use nimbus_core::FieldType;
//! use serde_json::json;
//!
//! let schema = Schema::builder("account")
//!     .field(FieldSpec::new("id", FieldType::String))
//!     .field(
//!         FieldSpec::new("currency", FieldType::String)
//!             .wire_path(["currency-type", "billingCurrency"]),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let wire = json!({"id": "acc-1", "currency-type": {"billingCurrency": "EUR"}});
//! let account = Model::from_wire(&schema, &wire).unwrap();
//! assert_eq!(account.get("currency").unwrap().as_str(), Some("EUR"));
//! assert_eq!(account.to_wire(), wire);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use nimbus_core::wire::{decode, encode};
use nimbus_core::{
    Binding, DependencyId, EventStream, Instant, Pending, Subscription, TypedCell, Value,
};
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::error::{ModelError, SyncError};
use crate::schema::{FieldCell, Schema};
use crate::store::{Store, StoreReply};
use crate::sync::{Fetchable, SyncEvent, SyncOutcome, SyncStatus, SyncTracker};

struct ModelInner {
    schema: Rc<Schema>,
    cells: IndexMap<String, FieldCell>,
    key: RefCell<DependencyId>,
    pinned: Cell<bool>,
    store: RefCell<Option<Rc<dyn Store>>>,
    sync: SyncTracker,
}

/// One resource instance. Cloning yields another handle to the same model.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Model");
        s.field("schema", &self.inner.schema.name());
        for (name, cell) in &self.inner.cells {
            s.field(name, &cell.cell().read());
        }
        s.finish()
    }
}

impl Model {
    /// A model with every cell at its default.
    pub fn new(schema: &Rc<Schema>) -> Result<Self, ModelError> {
        Ok(Self {
            inner: Rc::new(ModelInner {
                schema: Rc::clone(schema),
                cells: schema.make_cells()?,
                key: RefCell::new(DependencyId::generate()),
                pinned: Cell::new(false),
                store: RefCell::new(None),
                sync: SyncTracker::default(),
            }),
        })
    }

    /// A model populated from a server payload.
    pub fn from_wire(schema: &Rc<Schema>, wire: &Json) -> Result<Self, ModelError> {
        let model = Self::new(schema)?;
        model.parse(wire)?;
        Ok(model)
    }

    /// Attach a store. From now on the model is keyed by its resource URL,
    /// which follows the id once `parse` or `set` assigns one.
    #[must_use]
    pub fn with_store(self, store: Rc<dyn Store>) -> Self {
        self.set_store(store);
        self
    }

    pub fn set_store(&self, store: Rc<dyn Store>) {
        *self.inner.store.borrow_mut() = Some(store);
    }

    /// Pin the registry key. A pinned key wins over the store URL.
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

    /// Registry key: the pinned key, else the resource URL of the current
    /// id, else a generated id.
    #[must_use]
    pub fn key(&self) -> DependencyId {
        if !self.inner.pinned.get() {
            if let Some(store) = self.store() {
                return DependencyId::from_url(store.url(self.id().as_deref()));
            }
        }
        self.inner.key.borrow().clone()
    }

    /// Current value of `field`; [`Value::Null`] when empty.
    pub fn get(&self, field: &str) -> Result<Value, ModelError> {
        Ok(self.field(field)?.cell().read().unwrap_or_default())
    }

    /// Write `field`, surfacing the cell's error unchanged.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = into_option(value.into());
        self.field(field)?.write(value)?;
        Ok(())
    }

    /// The cell behind `field`.
    pub fn cell(&self, field: &str) -> Result<&TypedCell<Value>, ModelError> {
        Ok(self.field(field)?.cell())
    }

    pub fn field(&self, field: &str) -> Result<&FieldCell, ModelError> {
        self.inner
            .cells
            .get(field)
            .ok_or_else(|| ModelError::UnknownField(field.to_owned()))
    }

    /// Observe one field.
    pub fn subscribe(
        &self,
        field: &str,
        callback: impl Fn(Option<&Value>) + 'static,
    ) -> Result<Subscription, ModelError> {
        Ok(self.cell(field)?.subscribe(callback))
    }

    /// A live read view of one field.
    pub fn bind(&self, field: &str) -> Result<Binding<Value>, ModelError> {
        Ok(self
            .cell(field)?
            .binding()
            .then(Option::unwrap_or_default))
    }

    /// The server-side id, rendered as a string.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        let cell = self.inner.cells.get(self.inner.schema.id_attribute())?;
        cell.cell().with(|v| v.and_then(Value::to_key))
    }

    /// First non-nullable field that holds no value.
    #[must_use]
    pub fn missing_required(&self) -> Option<&str> {
        self.inner
            .cells
            .iter()
            .find(|(_, cell)| {
                let cell = cell.cell();
                !cell.is_nullable() && cell.with(|v| v.is_none())
            })
            .map(|(name, _)| name.as_str())
    }

    /// Serialize every field at its wire path.
    #[must_use]
    pub fn to_wire(&self) -> Json {
        let mut root = Map::new();
        for spec in self.inner.schema.fields() {
            let value = self.inner.cells[spec.name.as_str()].cell().read();
            let json = value.as_ref().map_or(Json::Null, encode);
            insert_at(&mut root, &spec.path(), json);
        }
        Json::Object(root)
    }

    /// Apply a server payload to the cells, all or nothing.
    pub fn parse(&self, wire: &Json) -> Result<(), ModelError> {
        let staged = self.stage(wire)?;
        for (cell, value) in staged {
            cell.write(value)?;
        }
        Ok(())
    }

    /// Whether `parse(wire)` would succeed.
    pub(crate) fn check(&self, wire: &Json) -> Result<(), ModelError> {
        self.stage(wire).map(drop)
    }

    /// Decode and validate a payload without writing it.
    fn stage(&self, wire: &Json) -> Result<Vec<(&FieldCell, Option<Value>)>, ModelError> {
        let Json::Object(root) = wire else {
            return Err(ModelError::Malformed(format!(
                "expected an object for `{}`",
                self.inner.schema.name()
            )));
        };
        let mut staged = Vec::new();
        for spec in self.inner.schema.fields() {
            let Some(raw) = lookup(root, &spec.path()) else {
                continue;
            };
            let value = decode(&spec.field_type, raw).map_err(|source| ModelError::Wire {
                field: spec.name.clone(),
                source,
            })?;
            let cell = &self.inner.cells[spec.name.as_str()];
            let value = into_option(value);
            cell.cell().validate(value.as_ref())?;
            staged.push((cell, value));
        }
        Ok(staged)
    }

    /// Outcome of the last completed sync.
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

    /// Observe changes of [`status`](Self::status).
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_status(&self, callback: impl Fn(&SyncStatus) + 'static) -> Subscription {
        self.inner.sync.subscribe_status(callback)
    }

    /// Resource URL, when a store is attached.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.store().map(|store| store.url(self.id().as_deref()))
    }

    /// Reload this model from its store.
    pub fn fetch(&self) -> Pending<SyncOutcome> {
        self.sync_with(|store, id| store.fetch(id))
    }

    /// Send this model to its store. A JSON object in the reply (for example
    /// one carrying a newly assigned id) is parsed back into the model.
    pub fn save(&self) -> Pending<SyncOutcome> {
        let body = self.to_wire();
        self.sync_with(move |store, id| store.save(id, body))
    }

    fn sync_with(
        &self,
        start: impl FnOnce(&dyn Store, Option<&str>) -> Pending<StoreReply>,
    ) -> Pending<SyncOutcome> {
        let sync = self.inner.sync.clone();
        sync.begin();
        let Some(store) = self.store() else {
            let outcome = SyncOutcome::Failed(SyncError::NoStore);
            sync.finish(&outcome, Instant::now());
            return Pending::ready(outcome);
        };
        let reply = start(store.as_ref(), self.id().as_deref());
        let model = self.clone();
        reply.map(move |reply| {
            let outcome = model.apply(reply);
            debug!(schema = model.inner.schema.name(), ?outcome, "model sync settled");
            model.inner.sync.finish(&outcome, store.now());
            outcome
        })
    }

    fn apply(&self, reply: &StoreReply) -> SyncOutcome {
        match reply {
            StoreReply::Body(body @ Json::Object(_)) => match self.parse(body) {
                Ok(()) => SyncOutcome::Synced,
                Err(err) => SyncOutcome::Failed(SyncError::Malformed(err.to_string())),
            },
            StoreReply::Body(Json::Null) => SyncOutcome::Synced,
            StoreReply::Body(other) => SyncOutcome::Failed(SyncError::Malformed(format!(
                "expected an object, found {}",
                nimbus_core::wire::json_kind(other)
            ))),
            StoreReply::TimedOut => SyncOutcome::TimedOut,
            StoreReply::Failed(err) => SyncOutcome::Failed(err.clone()),
        }
    }

    /// Whether two handles refer to the same model.
    #[must_use]
    pub fn same_as(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Fetchable for Model {
    fn fetch(&self) -> Pending<SyncOutcome> {
        Model::fetch(self)
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

fn into_option(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

fn lookup<'a>(root: &'a Map<String, Json>, path: &[&str]) -> Option<&'a Json> {
    let (last, parents) = path.split_last()?;
    let mut node = root;
    for key in parents {
        node = node.get(*key)?.as_object()?;
    }
    node.get(*last)
}

fn insert_at(root: &mut Map<String, Json>, path: &[&str], value: Json) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let slot = node
            .entry(*key)
            .or_insert_with(|| Json::Object(Map::new()));
        if !slot.is_object() {
            *slot = Json::Object(Map::new());
        }
        let Json::Object(next) = slot else {
            return;
        };
        node = next;
    }
    node.insert((*last).to_owned(), value);
}

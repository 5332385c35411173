#![forbid(unsafe_code)]

//! Container cells: lists and dictionaries of [`Value`]s.
//!
//! A [`GroupingCell`] wraps a [`TypedCell<Value>`] whose guard admits only one
//! container kind and, when an element type is declared, only containers
//! whose every element is an instance of it.
//!
//! The container itself is replaced wholesale on each write; the cell handle
//! and its subscribers stay put. Element helpers ([`push`](GroupingCell::push),
//! [`insert_entry`](GroupingCell::insert_entry), ...) rebuild the container,
//! validate the new element, and write once, so subscribers see one
//! notification per mutation.

use indexmap::IndexMap;

use crate::cell::{Guard, TypedCell};
use crate::error::CellError;
use crate::reactive::Subscription;
use crate::value::{FieldType, Value};

/// Which container shape a [`GroupingCell`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Dictionary,
}

impl ContainerKind {
    fn field_type(self, element: Option<FieldType>) -> FieldType {
        let element = element.map(Box::new);
        match self {
            Self::List => FieldType::List(element),
            Self::Dictionary => FieldType::Dictionary(element),
        }
    }

    fn empty(self) -> Value {
        match self {
            Self::List => Value::List(Vec::new()),
            Self::Dictionary => Value::Dictionary(IndexMap::new()),
        }
    }
}

/// A cell holding a list or dictionary.
#[derive(Debug, Clone)]
pub struct GroupingCell {
    cell: TypedCell<Value>,
    kind: ContainerKind,
    element: Option<FieldType>,
}

impl GroupingCell {
    /// A non-nullable list cell starting empty.
    #[must_use]
    pub fn list(name: impl Into<String>, element: Option<FieldType>) -> Self {
        Self::empty_of(name.into(), ContainerKind::List, element)
    }

    /// A non-nullable dictionary cell starting empty.
    #[must_use]
    pub fn dictionary(name: impl Into<String>, element: Option<FieldType>) -> Self {
        Self::empty_of(name.into(), ContainerKind::Dictionary, element)
    }

    fn empty_of(name: String, kind: ContainerKind, element: Option<FieldType>) -> Self {
        let guard = Guard::field_type(&kind.field_type(element.clone()));
        // An empty container satisfies every element type.
        let cell = TypedCell::trusted(name, guard, false, Some(kind.empty()));
        Self {
            cell,
            kind,
            element,
        }
    }

    /// Build from a declared container type.
    ///
    /// Returns `None` when `field_type` is not a container.
    pub fn from_field_type(
        name: impl Into<String>,
        field_type: &FieldType,
        nullable: bool,
        default: Option<Value>,
    ) -> Option<Result<Self, CellError>> {
        let kind = match field_type {
            FieldType::List(_) => ContainerKind::List,
            FieldType::Dictionary(_) => ContainerKind::Dictionary,
            _ => return None,
        };
        let element = field_type.element().cloned();
        let cell = TypedCell::new(name, Guard::field_type(field_type), nullable, default);
        Some(cell.map(|cell| Self {
            cell,
            kind,
            element,
        }))
    }

    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    #[must_use]
    pub fn element_type(&self) -> Option<&FieldType> {
        self.element.as_ref()
    }

    /// The underlying cell.
    #[must_use]
    pub fn cell(&self) -> &TypedCell<Value> {
        &self.cell
    }

    #[must_use]
    pub fn read(&self) -> Option<Value> {
        self.cell.read()
    }

    /// Replace the whole container.
    pub fn write(&self, value: Option<Value>) -> Result<(), CellError> {
        if let Some(Value::List(items)) = &value {
            self.check_elements(items.iter().enumerate().map(|(i, v)| (i.to_string(), v)))?;
        }
        if let Some(Value::Dictionary(entries)) = &value {
            self.check_elements(entries.iter().map(|(k, v)| (k.clone(), v)))?;
        }
        self.cell.write(value)
    }

    /// Number of elements; zero when the cell is null.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cell.with(|v| match v {
            Some(Value::List(items)) => items.len(),
            Some(Value::Dictionary(entries)) => entries.len(),
            _ => 0,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to a list cell. A null list is treated as empty.
    pub fn push(&self, item: Value) -> Result<(), CellError> {
        let mut items = self.list_items()?;
        self.check_element(&items.len().to_string(), &item)?;
        items.push(item);
        self.cell.write(Some(Value::List(items)))
    }

    /// Remove and return the element at `index`, or `None` when out of range.
    pub fn remove_at(&self, index: usize) -> Result<Option<Value>, CellError> {
        let mut items = self.list_items()?;
        if index >= items.len() {
            return Ok(None);
        }
        let removed = items.remove(index);
        self.cell.write(Some(Value::List(items)))?;
        Ok(Some(removed))
    }

    /// Insert or replace a dictionary entry, returning the previous value.
    pub fn insert_entry(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, CellError> {
        let key = key.into();
        let mut entries = self.dictionary_entries()?;
        self.check_element(&key, &value)?;
        let previous = entries.insert(key, value);
        self.cell.write(Some(Value::Dictionary(entries)))?;
        Ok(previous)
    }

    /// Remove a dictionary entry, keeping the order of the others.
    pub fn remove_entry(&self, key: &str) -> Result<Option<Value>, CellError> {
        let mut entries = self.dictionary_entries()?;
        let Some(removed) = entries.shift_remove(key) else {
            return Ok(None);
        };
        self.cell.write(Some(Value::Dictionary(entries)))?;
        Ok(Some(removed))
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(Option<&Value>) + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    fn list_items(&self) -> Result<Vec<Value>, CellError> {
        match self.cell.read() {
            Some(Value::List(items)) => Ok(items),
            None if self.kind == ContainerKind::List => Ok(Vec::new()),
            _ => Err(self.wrong_kind("list")),
        }
    }

    fn dictionary_entries(&self) -> Result<IndexMap<String, Value>, CellError> {
        match self.cell.read() {
            Some(Value::Dictionary(entries)) => Ok(entries),
            None if self.kind == ContainerKind::Dictionary => Ok(IndexMap::new()),
            _ => Err(self.wrong_kind("dictionary")),
        }
    }

    fn wrong_kind(&self, wanted: &str) -> CellError {
        CellError::TypeViolation {
            cell: self.cell.name().to_owned(),
            expected: self.cell.guard().expected().to_owned(),
            found: format!("{wanted} operation"),
        }
    }

    fn check_elements<'a>(
        &self,
        mut elements: impl Iterator<Item = (String, &'a Value)>,
    ) -> Result<(), CellError> {
        elements.try_for_each(|(at, value)| self.check_element(&at, value))
    }

    fn check_element(&self, at: &str, value: &Value) -> Result<(), CellError> {
        let Some(element) = &self.element else {
            return Ok(());
        };
        if element.admits(value) {
            return Ok(());
        }
        Err(CellError::TypeViolation {
            cell: format!("{}[{at}]", self.cell.name()),
            expected: element.to_string(),
            found: value.describe().to_owned(),
        })
    }
}

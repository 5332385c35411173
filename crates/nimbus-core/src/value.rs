//! Dynamic field values and their type tags.
//!
//! Server-backed entities are described by a schema at runtime, so a field's
//! contents are carried as a [`Value`] and checked against a [`FieldType`].
//! The set of type tags is closed: `string`, `number`, `boolean`, `date`,
//! `list`, `dictionary`, `file`.
//!
//! Numbers keep their `serde_json::Number` representation so an integer read
//! from the wire is written back as an integer.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Number;

/// A declared field type.
///
/// `List` and `Dictionary` optionally constrain their elements. Without an
/// element type any non-container element shape is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    List(Option<Box<FieldType>>),
    Dictionary(Option<Box<FieldType>>),
    File,
}

impl FieldType {
    /// An untyped list.
    #[must_use]
    pub const fn list() -> Self {
        Self::List(None)
    }

    /// A list whose elements must all be `element`.
    #[must_use]
    pub fn list_of(element: FieldType) -> Self {
        Self::List(Some(Box::new(element)))
    }

    /// An untyped dictionary.
    #[must_use]
    pub const fn dictionary() -> Self {
        Self::Dictionary(None)
    }

    /// A dictionary whose values must all be `element`.
    #[must_use]
    pub fn dictionary_of(element: FieldType) -> Self {
        Self::Dictionary(Some(Box::new(element)))
    }

    /// The wire type tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::List(_) => "list",
            Self::Dictionary(_) => "dictionary",
            Self::File => "file",
        }
    }

    /// Whether this is a list or dictionary.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Dictionary(_))
    }

    /// Declared element type of a container.
    #[must_use]
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            Self::List(elem) | Self::Dictionary(elem) => elem.as_deref(),
            _ => None,
        }
    }

    /// Whether `value` is a non-null instance of this type.
    ///
    /// Container elements are checked recursively when an element type is
    /// declared. Null elements are never admitted inside a typed container.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Boolean(_))
            | (Self::Date, Value::Date(_))
            | (Self::File, Value::File(_)) => true,
            (Self::List(elem), Value::List(items)) => match elem {
                Some(elem) => items.iter().all(|item| elem.admits(item)),
                None => true,
            },
            (Self::Dictionary(elem), Value::Dictionary(entries)) => match elem {
                Some(elem) => entries.values().all(|item| elem.admits(item)),
                None => true,
            },
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element() {
            Some(elem) => write!(f, "{}<{elem}>", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

/// An uploaded or downloaded file carried inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

impl FileBlob {
    #[must_use]
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content,
        }
    }
}

/// The contents of one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Number(Number),
    Boolean(bool),
    Date(DateTime<Utc>),
    List(Vec<Value>),
    Dictionary(IndexMap<String, Value>),
    File(FileBlob),
}

impl Value {
    /// Type tag of this value (`"null"` for [`Value::Null`]).
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::List(_) => "list",
            Self::Dictionary(_) => "dictionary",
            Self::File(_) => "file",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_dictionary(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_file(&self) -> Option<&FileBlob> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// Render a scalar as an identifier string.
    ///
    /// Strings are returned as-is and numbers in their wire form; every
    /// other shape yields `None`.
    #[must_use]
    pub fn to_key(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Number(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(v.into())
    }
}

/// Non-finite floats have no JSON form and become [`Value::Null`].
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Number::from_f64(v).map_or(Self::Null, Self::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Self::Dictionary(v)
    }
}

impl From<FileBlob> for Value {
    fn from(v: FileBlob) -> Self {
        Self::File(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

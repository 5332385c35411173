//! Static model shapes.
//!
//! A [`Schema`] is built once per resource type and shared by every
//! [`Model`](crate::Model) of that type. Each [`FieldSpec`] declares a type
//! tag, nullability, an optional default and extra guard, and where the
//! field lives in the server's JSON (`wire_path`).

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use nimbus_core::{CellError, FieldType, Guard, GroupingCell, TypedCell, Value};

use crate::error::ModelError;

/// One declared field.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub guard: Option<Guard<Value>>,
    /// Object keys leading to the value on the wire. Empty means `[name]`.
    pub wire_path: Vec<String>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("default", &self.default)
            .field("wire_path", &self.wire_path)
            .finish_non_exhaustive()
    }
}

impl FieldSpec {
    /// A nullable field with no default, stored under its own name.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            default: None,
            guard: None,
            wire_path: Vec::new(),
        }
    }

    /// Reject null writes.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// An extra predicate on top of the type check.
    #[must_use]
    pub fn guard(mut self, guard: Guard<Value>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Read and write this field at a nested or renamed wire location.
    #[must_use]
    pub fn wire_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wire_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// The effective wire path.
    #[must_use]
    pub fn path(&self) -> Vec<&str> {
        if self.wire_path.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.wire_path.iter().map(String::as_str).collect()
        }
    }

    fn cell_guard(&self) -> Guard<Value> {
        let typed = Guard::field_type(&self.field_type);
        match &self.guard {
            Some(extra) => typed.and(extra.clone()),
            None => typed,
        }
    }

    pub(crate) fn make_cell(&self) -> Result<FieldCell, CellError> {
        if self.field_type.is_container() && self.guard.is_none() {
            if let Some(group) = GroupingCell::from_field_type(
                self.name.clone(),
                &self.field_type,
                self.nullable,
                self.default.clone(),
            ) {
                return group.map(FieldCell::Group);
            }
        }
        TypedCell::new(
            self.name.clone(),
            self.cell_guard(),
            self.nullable,
            self.default.clone(),
        )
        .map(FieldCell::Scalar)
    }
}

/// The cell backing one model field.
#[derive(Debug, Clone)]
pub enum FieldCell {
    Scalar(TypedCell<Value>),
    Group(GroupingCell),
}

impl FieldCell {
    #[must_use]
    pub fn cell(&self) -> &TypedCell<Value> {
        match self {
            Self::Scalar(cell) => cell,
            Self::Group(group) => group.cell(),
        }
    }

    /// The grouping view, for container fields.
    #[must_use]
    pub fn as_group(&self) -> Option<&GroupingCell> {
        match self {
            Self::Group(group) => Some(group),
            Self::Scalar(_) => None,
        }
    }

    pub fn write(&self, value: Option<Value>) -> Result<(), CellError> {
        match self {
            Self::Scalar(cell) => cell.write(value),
            Self::Group(group) => group.write(value),
        }
    }
}

/// A named, ordered set of fields plus the id attribute.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
    id_attribute: String,
}

impl Schema {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            id_attribute: "id".to_owned(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the field holding the server-side id.
    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    pub(crate) fn make_cells(&self) -> Result<IndexMap<String, FieldCell>, CellError> {
        self.fields
            .iter()
            .map(|spec| Ok((spec.name.clone(), spec.make_cell()?)))
            .collect()
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
#[must_use]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    id_attribute: String,
}

impl SchemaBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Fails on duplicate field names, on wire paths that collide or nest
    /// inside one another, and on defaults their own field would reject.
    pub fn build(self) -> Result<Rc<Schema>, ModelError> {
        let invalid = |reason: String| ModelError::InvalidSchema {
            schema: self.name.clone(),
            reason,
        };
        let mut names = HashSet::new();
        for spec in &self.fields {
            if !names.insert(spec.name.as_str()) {
                return Err(invalid(format!("duplicate field `{}`", spec.name)));
            }
        }
        let paths: Vec<Vec<&str>> = self.fields.iter().map(FieldSpec::path).collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                let shared = a.len().min(b.len());
                if a[..shared] == b[..shared] {
                    return Err(invalid(format!(
                        "wire paths `{}` and `{}` overlap",
                        a.join("."),
                        b.join(".")
                    )));
                }
            }
        }
        let schema = Schema {
            name: self.name.clone(),
            fields: self.fields,
            id_attribute: self.id_attribute,
        };
        schema.make_cells()?;
        Ok(Rc::new(schema))
    }
}

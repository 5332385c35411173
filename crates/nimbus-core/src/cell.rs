#![forbid(unsafe_code)]

//! Type-guarded observable storage cells.
//!
//! A [`TypedCell<T>`] is one mutable field of a model: an
//! [`Observable<Option<T>>`](crate::reactive::Observable) behind a runtime
//! [`Guard`] and a nullability flag.
//!
//! # Invariants
//!
//! 1. Every write is checked before anything is stored. `None` on a
//!    non-nullable cell fails with [`CellError::NullViolation`]; a value the
//!    guard rejects fails with [`CellError::TypeViolation`].
//! 2. A failed write leaves the stored value and version untouched.
//! 3. `read()` returns the last successfully written value.
//! 4. A default must itself pass the guard; [`TypedCell::new`] fails
//!    otherwise.
//! 5. Subscribers run synchronously, in subscription order, before `write()`
//!    returns. A write equal to the current value succeeds silently.
//!
//! # Example
//!
//! ```
//! use nimbus_core::cell::{Guard, TypedCell};
//!
//! let port = TypedCell::new(
//!     "port",
//!     Guard::new("port number", |p: &i64| (1..=65_535).contains(p)),
//!     false,
//!     Some(443),
//! )
//! .unwrap();
//!
//! assert!(port.set(8080).is_ok());
//! assert!(port.set(0).is_err());
//! assert!(port.write(None).is_err());
//! assert_eq!(port.read(), Some(8080));
//! ```

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::CellError;
use crate::reactive::{Binding, Observable, Subscription, bind_observable};
use crate::value::{FieldType, Value};

/// A value that can live in a [`TypedCell`].
pub trait CellValue: Clone + PartialEq + 'static {
    /// Short description of this value's type, used in error messages.
    fn describe(&self) -> Cow<'static, str>;
}

impl CellValue for Value {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed(Value::describe(self))
    }
}

impl CellValue for String {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("string")
    }
}

impl CellValue for bool {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("boolean")
    }
}

impl CellValue for i64 {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Owned(format!("number {self}"))
    }
}

impl CellValue for f64 {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Owned(format!("number {self}"))
    }
}

impl CellValue for DateTime<Utc> {
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("date")
    }
}

/// A named runtime predicate over cell values.
pub struct Guard<T> {
    expected: Rc<str>,
    check: Rc<dyn Fn(&T) -> bool>,
}

impl<T> Clone for Guard<T> {
    fn clone(&self) -> Self {
        Self {
            expected: Rc::clone(&self.expected),
            check: Rc::clone(&self.check),
        }
    }
}

impl<T> fmt::Debug for Guard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.expected).finish()
    }
}

impl<T: 'static> Guard<T> {
    /// A guard described as `expected` that admits values where `check` holds.
    pub fn new(expected: impl Into<String>, check: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            expected: Rc::from(expected.into()),
            check: Rc::new(check),
        }
    }

    /// A guard that admits everything. Static typing already did the work.
    #[must_use]
    pub fn any() -> Self {
        Self::new("any", |_| true)
    }

    /// Both guards must admit the value.
    #[must_use]
    pub fn and(self, other: Guard<T>) -> Self {
        let expected = format!("{} and {}", self.expected, other.expected);
        Self::new(expected, move |v| (self.check)(v) && (other.check)(v))
    }

    /// Description of admitted values.
    #[must_use]
    pub fn expected(&self) -> &str {
        &self.expected
    }

    #[must_use]
    pub fn admits(&self, value: &T) -> bool {
        (self.check)(value)
    }
}

impl Guard<Value> {
    /// Admit exactly the instances of `field_type`.
    #[must_use]
    pub fn field_type(field_type: &FieldType) -> Self {
        let ty = field_type.clone();
        Self::new(field_type.to_string(), move |v| ty.admits(v))
    }
}

/// One observable, type-guarded storage location.
///
/// Cloning yields another handle to the same cell.
pub struct TypedCell<T> {
    name: Rc<str>,
    value: Observable<Option<T>>,
    guard: Guard<T>,
    nullable: bool,
    default: Option<T>,
}

impl<T: Clone> Clone for TypedCell<T> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            value: self.value.clone(),
            guard: self.guard.clone(),
            nullable: self.nullable,
            default: self.default.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TypedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCell")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("guard", &self.guard)
            .field("nullable", &self.nullable)
            .finish()
    }
}

impl<T: CellValue> TypedCell<T> {
    /// Create a cell, writing `default` through the guard first.
    ///
    /// A non-nullable cell created without a default starts empty: it reads
    /// `None` until its first successful write.
    pub fn new(
        name: impl Into<String>,
        guard: Guard<T>,
        nullable: bool,
        default: Option<T>,
    ) -> Result<Self, CellError> {
        let name: Rc<str> = Rc::from(name.into());
        if let Some(value) = &default {
            check(&name, &guard, value)?;
        }
        Ok(Self {
            name,
            value: Observable::new(default.clone()),
            guard,
            nullable,
            default,
        })
    }

    /// A nullable cell with no default.
    #[must_use]
    pub fn nullable(name: impl Into<String>, guard: Guard<T>) -> Self {
        Self::trusted(name.into(), guard, true, None)
    }

    /// Construct without checking `default`; the caller vouches for it.
    pub(crate) fn trusted(
        name: String,
        guard: Guard<T>,
        nullable: bool,
        default: Option<T>,
    ) -> Self {
        Self {
            name: Rc::from(name),
            value: Observable::new(default.clone()),
            guard,
            nullable,
            default,
        }
    }

    /// The last successfully written value.
    #[must_use]
    pub fn read(&self) -> Option<T> {
        self.value.get()
    }

    /// Borrow the stored value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.value.with(|v| f(v.as_ref()))
    }

    /// Check `value` and store it.
    pub fn write(&self, value: Option<T>) -> Result<(), CellError> {
        if let Err(err) = self.validate(value.as_ref()) {
            trace!(cell = %self.name, %err, "write rejected");
            return Err(err);
        }
        self.value.set(value);
        Ok(())
    }

    /// Shorthand for `write(Some(value))`.
    pub fn set(&self, value: T) -> Result<(), CellError> {
        self.write(Some(value))
    }

    /// Check a candidate without storing it.
    pub fn validate(&self, value: Option<&T>) -> Result<(), CellError> {
        match value {
            None if self.nullable => Ok(()),
            None => Err(CellError::NullViolation {
                cell: self.name.to_string(),
            }),
            Some(value) => check(&self.name, &self.guard, value),
        }
    }

    /// Restore the construction-time default.
    pub fn reset(&self) {
        self.value.set(self.default.clone());
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn guard(&self) -> &Guard<T> {
        &self.guard
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&T> {
        self.default.as_ref()
    }

    /// Number of value changes since construction.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.value.version()
    }

    /// Observe every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(Option<&T>) + 'static) -> Subscription {
        self.value.subscribe(move |v| callback(v.as_ref()))
    }

    /// A live read view of this cell.
    #[must_use]
    pub fn binding(&self) -> Binding<Option<T>> {
        bind_observable(&self.value)
    }

    /// Whether two handles refer to the same cell.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.value.same_as(&other.value)
    }
}

fn check<T: CellValue>(name: &str, guard: &Guard<T>, value: &T) -> Result<(), CellError> {
    if guard.admits(value) {
        Ok(())
    } else {
        Err(CellError::TypeViolation {
            cell: name.to_owned(),
            expected: guard.expected().to_owned(),
            found: value.describe().into_owned(),
        })
    }
}

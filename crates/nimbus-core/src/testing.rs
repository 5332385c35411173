//! Helpers for asserting on notifications in tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An append-only log shared between a test and the callbacks it installs.
pub struct CallLog<T> {
    entries: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
        }
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CallLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.borrow().iter()).finish()
    }
}

impl<T: Clone + 'static> CallLog<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: T) {
        self.entries.borrow_mut().push(entry);
    }

    /// A callback that records whatever it is handed.
    pub fn recorder<A: ?Sized + 'static>(&self, map: impl Fn(&A) -> T + 'static) -> impl Fn(&A) + 'static {
        let log = self.clone();
        move |arg: &A| log.push(map(arg))
    }

    #[must_use]
    pub fn entries(&self) -> Vec<T> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

//! Stable keys for refreshable dependencies.

use std::fmt;

use uuid::Uuid;

/// Identifies a dependency in the strategy registry.
///
/// A dependency is keyed either by a generated UUID (unique to one handle)
/// or by its resource URL, so that a recreated dependency for the same
/// resource keeps its registered strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyId {
    Generated(Uuid),
    Url(String),
}

impl DependencyId {
    /// A fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self::Generated(Uuid::new_v4())
    }

    /// A key shared by every dependency for `url`.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Generated(_) => None,
        }
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated(uuid) => write!(f, "dep:{uuid}"),
            Self::Url(url) => f.write_str(url),
        }
    }
}

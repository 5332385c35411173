#![forbid(unsafe_code)]

//! Server-backed models for Nimbus.
//!
//! This crate provides:
//! - [`Schema`] / [`FieldSpec`]: declared model shapes and wire paths
//! - [`Model`]: one resource instance as a set of observable cells
//! - [`Collection`]: an ordered listing reconciled against the server
//! - [`Store`] / [`HttpStore`]: URL composition, HTTP sync, timeouts, and
//!   [`ErrorMapper`]-based failure translation
//! - [`Transport`]: the network boundary
//! - [`Fetchable`]: what a live updater needs from a target

pub mod collection;
pub mod error;
pub mod error_map;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod model;
pub mod schema;
pub mod store;
pub mod sync;
pub mod transport;

pub use collection::{Collection, CollectionEvent};
pub use error::{DomainError, DomainErrorKind, ModelError, SyncError};
pub use error_map::{ErrorMapper, ProxyErrorMapper, StatusErrorMapper};
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockTransport;
pub use model::Model;
pub use schema::{FieldCell, FieldSpec, Schema, SchemaBuilder};
pub use store::{DEFAULT_TIMEOUT, Endpoint, HttpStore, Store, StoreBuilder, StoreReply};
pub use sync::{Fetchable, SyncEvent, SyncOutcome, SyncStatus};
pub use transport::{
    HttpRequest, HttpResponse, Method, Responder, Transport, TransportError, TransportResult,
};

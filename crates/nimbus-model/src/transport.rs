//! The network boundary.
//!
//! A [`Transport`] performs one HTTP exchange and reports the result through
//! a [`Responder`]. The browser host implements it over `fetch`; tests use
//! `MockTransport` (feature `test-helpers`).

use std::fmt;

use nimbus_core::Resolver;
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Json>,
    /// Backend tenant the proxy should route to.
    pub provider_id: Option<String>,
}

/// A response as received, before error mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Json,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: Json) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn ok(body: Json) -> Self {
        Self::new(200, body)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The exchange failed below HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("response body is not JSON: {0}")]
    Decode(String),
    #[error("request aborted")]
    Aborted,
}

pub type TransportResult = Result<HttpResponse, TransportError>;

/// Completion side of one exchange.
pub type Responder = Resolver<TransportResult>;

/// Performs HTTP exchanges.
pub trait Transport {
    /// Start `request`; resolve `responder` when it completes.
    ///
    /// Resolution may happen synchronously or from a later turn of the host
    /// event loop. Resolving after the store has given up is harmless.
    fn send(&self, request: HttpRequest, responder: Responder);
}

//! Persistence strategies.
//!
//! A [`Store`] knows a resource's URL and how to move its wire form to and
//! from the backend. Models and collections hold one by composition and
//! never see the transport directly.
//!
//! # Failure Modes
//!
//! | Condition | Reply |
//! |-----------|-------|
//! | 2xx response | [`StoreReply::Body`] |
//! | non-2xx response | [`StoreReply::Failed`] with a mapped [`DomainError`](crate::DomainError) |
//! | transport failure | [`StoreReply::Failed`] with [`SyncError::Transport`] |
//! | no response before the timeout | [`StoreReply::TimedOut`]; a later response is dropped |

use std::fmt;
use std::rc::Rc;

use nimbus_core::{Duration, Instant, Pending, Scheduler};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::error_map::{ErrorMapper, StatusErrorMapper};
use crate::transport::{HttpRequest, Method, Transport, TransportResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a store exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    Body(Json),
    TimedOut,
    Failed(SyncError),
}

/// Persistence for one resource type.
pub trait Store {
    /// URL of the resource, or of one instance when `id` is given.
    fn url(&self, id: Option<&str>) -> String;

    fn fetch(&self, id: Option<&str>) -> Pending<StoreReply>;

    /// Create (no id) or replace (with id) a resource.
    fn save(&self, id: Option<&str>, body: Json) -> Pending<StoreReply>;

    /// Backend tenant the requests are routed to.
    fn provider_id(&self) -> Option<&str>;

    /// The store's notion of the current time.
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `<base>/<resource segments>[/<id>][?query]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl Endpoint {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            segments: Vec::new(),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Compose the URL. Segments are joined with exactly one `/`.
    ///
    /// Segments are taken as written; the id and the query pairs are
    /// percent-encoded.
    #[must_use]
    pub fn url(&self, id: Option<&str>) -> String {
        let mut url = self.base.trim_end_matches('/').to_owned();
        for part in &self.segments {
            let part = part.trim_matches('/');
            if !part.is_empty() {
                url.push('/');
                url.push_str(part);
            }
        }
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            url.push('/');
            url.push_str(&urlencoding::encode(id));
        }
        if url.is_empty() {
            url.push('/');
        }
        for (i, (key, value)) in self.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}

/// A [`Store`] that talks HTTP through a [`Transport`].
#[derive(Clone)]
pub struct HttpStore {
    endpoint: Endpoint,
    transport: Rc<dyn Transport>,
    scheduler: Scheduler,
    timeout: Duration,
    mapper: Rc<dyn ErrorMapper>,
    provider_id: Option<String>,
}

impl fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStore")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

impl HttpStore {
    pub fn builder(
        endpoint: Endpoint,
        transport: Rc<dyn Transport>,
        scheduler: &Scheduler,
    ) -> StoreBuilder {
        StoreBuilder {
            endpoint,
            transport,
            scheduler: scheduler.clone(),
            timeout: DEFAULT_TIMEOUT,
            mapper: Rc::new(StatusErrorMapper),
            provider_id: None,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn exchange(&self, method: Method, id: Option<&str>, body: Option<Json>) -> Pending<StoreReply> {
        let url = self.url(id);
        debug!(%method, %url, provider = ?self.provider_id, "store request");

        let (reply, settle) = Pending::channel();
        let timer = {
            let settle = settle.clone();
            let url = url.clone();
            let timeout = self.timeout;
            self.scheduler.schedule(timeout, move || {
                if settle.resolve(StoreReply::TimedOut) {
                    warn!(%url, timeout_ms = timeout.as_millis() as u64, "store request timed out");
                }
            })
        };

        let (response, responder) = Pending::<TransportResult>::channel();
        let scheduler = self.scheduler.clone();
        let mapper = Rc::clone(&self.mapper);
        let request_url = url.clone();
        response.then(move |result| {
            scheduler.cancel(timer);
            let outcome = match result {
                Ok(resp) if resp.is_success() => StoreReply::Body(resp.body.clone()),
                Ok(resp) => StoreReply::Failed(SyncError::Domain(mapper.map(resp))),
                Err(err) => StoreReply::Failed(SyncError::Transport(err.clone())),
            };
            if !settle.resolve(outcome) {
                debug!(url = %request_url, "late response dropped");
            }
        });

        self.transport.send(
            HttpRequest {
                method,
                url,
                body,
                provider_id: self.provider_id.clone(),
            },
            responder,
        );
        reply
    }
}

impl Store for HttpStore {
    fn url(&self, id: Option<&str>) -> String {
        self.endpoint.url(id)
    }

    fn fetch(&self, id: Option<&str>) -> Pending<StoreReply> {
        self.exchange(Method::Get, id, None)
    }

    fn save(&self, id: Option<&str>, body: Json) -> Pending<StoreReply> {
        let method = if id.is_some() { Method::Put } else { Method::Post };
        self.exchange(method, id, Some(body))
    }

    fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    fn now(&self) -> Instant {
        self.scheduler.now()
    }
}

/// Builder for [`HttpStore`].
#[must_use]
pub struct StoreBuilder {
    endpoint: Endpoint,
    transport: Rc<dyn Transport>,
    scheduler: Scheduler,
    timeout: Duration,
    mapper: Rc<dyn ErrorMapper>,
    provider_id: Option<String>,
}

impl StoreBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn error_mapper(mut self, mapper: impl ErrorMapper + 'static) -> Self {
        self.mapper = Rc::new(mapper);
        self
    }

    pub fn provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn build(self) -> HttpStore {
        HttpStore {
            endpoint: self.endpoint,
            transport: self.transport,
            scheduler: self.scheduler,
            timeout: self.timeout,
            mapper: self.mapper,
            provider_id: self.provider_id,
        }
    }
}

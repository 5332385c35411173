//! Scripted in-memory [`Transport`] for tests.
//!
//! Requests either match a scripted reply (queued per method and URL and
//! answered synchronously inside `send`) or wait in a pending queue until
//! the test answers them with [`MockTransport::respond_next`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value as Json;

use crate::transport::{
    HttpRequest, HttpResponse, Method, Responder, Transport, TransportError, TransportResult,
};

#[derive(Default)]
struct MockState {
    scripted: HashMap<(Method, String), VecDeque<TransportResult>>,
    pending: VecDeque<(HttpRequest, Responder)>,
    log: Vec<HttpRequest>,
}

/// A transport whose answers are decided by the test.
///
/// Cloning yields another handle to the same script and log.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MockTransport")
            .field("requests", &state.log.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This handle as a shareable transport.
    #[must_use]
    pub fn shared(&self) -> Rc<dyn Transport> {
        Rc::new(self.clone())
    }

    /// Answer the next `method url` request immediately with `result`.
    pub fn script(&self, method: Method, url: impl Into<String>, result: TransportResult) {
        self.state
            .borrow_mut()
            .scripted
            .entry((method, url.into()))
            .or_default()
            .push_back(result);
    }

    /// Shorthand for scripting a `200 OK` GET.
    pub fn script_get(&self, url: impl Into<String>, body: Json) {
        self.script(Method::Get, url, Ok(HttpResponse::ok(body)));
    }

    /// Answer the oldest unanswered request. Returns `false` when none wait.
    pub fn respond_next(&self, result: TransportResult) -> bool {
        let next = self.state.borrow_mut().pending.pop_front();
        match next {
            Some((_, responder)) => {
                responder.resolve(result);
                true
            }
            None => false,
        }
    }

    /// Shorthand for answering the oldest request with `200 OK`.
    pub fn respond_ok(&self, body: Json) -> bool {
        self.respond_next(Ok(HttpResponse::ok(body)))
    }

    /// Fail every unanswered request with [`TransportError::Aborted`].
    pub fn abort_all(&self) -> usize {
        let pending: Vec<_> = self.state.borrow_mut().pending.drain(..).collect();
        let count = pending.len();
        for (_, responder) in pending {
            responder.resolve(Err(TransportError::Aborted));
        }
        count
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.borrow().log.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.borrow().log.len()
    }

    /// Requests still waiting for an answer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest, responder: Responder) {
        let scripted = {
            let mut state = self.state.borrow_mut();
            state.log.push(request.clone());
            let key = (request.method, request.url.clone());
            let reply = state.scripted.get_mut(&key).and_then(VecDeque::pop_front);
            if reply.is_none() {
                state.pending.push_back((request, responder.clone()));
            }
            reply
        };
        if let Some(result) = scripted {
            responder.resolve(result);
        }
    }
}

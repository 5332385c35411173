//! Translation of failed HTTP responses into [`DomainError`]s.
//!
//! | Mapper | Kind from | Message from |
//! |--------|-----------|--------------|
//! | [`StatusErrorMapper`] | HTTP status | body string, or `body.message`, or the kind |
//! | [`ProxyErrorMapper`] | `error.code` when numeric, else status | `error.message`, else as above |

use serde_json::Value as Json;

use crate::error::{DomainError, DomainErrorKind};
use crate::transport::HttpResponse;

/// Maps a non-2xx response to a typed domain error.
pub trait ErrorMapper {
    fn map(&self, response: &HttpResponse) -> DomainError;
}

/// Classifies by HTTP status alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusErrorMapper;

impl ErrorMapper for StatusErrorMapper {
    fn map(&self, response: &HttpResponse) -> DomainError {
        let kind = DomainErrorKind::from_status(response.status);
        let message = match &response.body {
            Json::String(text) if !text.is_empty() => text.clone(),
            body => body
                .get("message")
                .and_then(Json::as_str)
                .map_or_else(|| kind.to_string(), str::to_owned),
        };
        DomainError {
            kind,
            status: response.status,
            payload: response.body.clone(),
            message,
        }
    }
}

/// Reads the API proxy's `{"error": {"code": .., "message": ..}}` envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyErrorMapper;

impl ErrorMapper for ProxyErrorMapper {
    fn map(&self, response: &HttpResponse) -> DomainError {
        let mut mapped = StatusErrorMapper.map(response);
        let Some(envelope) = response.body.get("error") else {
            return mapped;
        };
        if let Some(code) = envelope.get("code").and_then(code_status) {
            mapped.kind = DomainErrorKind::from_status(code);
        }
        if let Some(message) = envelope.get("message").and_then(Json::as_str) {
            mapped.message = message.to_owned();
        }
        mapped
    }
}

fn code_status(code: &Json) -> Option<u16> {
    match code {
        Json::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapper_keeps_payload() {
        let resp = HttpResponse::new(404, json!({"message": "no such vm"}));
        let err = StatusErrorMapper.map(&resp);
        assert_eq!(err.kind, DomainErrorKind::NotFound);
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "no such vm");
        assert_eq!(err.payload, resp.body);
    }

    #[test]
    fn status_mapper_falls_back_to_kind() {
        let err = StatusErrorMapper.map(&HttpResponse::new(500, json!(null)));
        assert_eq!(err.message, "server error");
    }

    #[test]
    fn proxy_envelope_overrides() {
        let resp = HttpResponse::new(
            500,
            json!({"error": {"code": "409", "message": "name already taken"}}),
        );
        let err = ProxyErrorMapper.map(&resp);
        assert_eq!(err.kind, DomainErrorKind::Conflict);
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "name already taken");
    }

    #[test]
    fn proxy_without_envelope_behaves_like_status() {
        let resp = HttpResponse::new(403, json!("denied"));
        assert_eq!(ProxyErrorMapper.map(&resp), StatusErrorMapper.map(&resp));
    }
}

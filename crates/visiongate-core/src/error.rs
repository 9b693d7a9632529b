use bytes::Bytes;
use http::StatusCode;
use serde_json::json;
use visiongate_provider_core::{ProviderError, UpstreamFailure, UpstreamReadFault};

use crate::normalize::NormalizeError;

/// A response the gateway produces itself, before any stream is committed.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    pub fn json(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: error_body(code, &message.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::json(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<NormalizeError> for ProxyError {
    fn from(err: NormalizeError) -> Self {
        Self::json(err.status(), err.code(), err.to_string())
    }
}

/// Failures discovered after the event stream has started. They can only be
/// reported in-band as an `error` frame.
#[derive(Debug, thiserror::Error)]
pub enum StreamFault {
    #[error("upstream returned no body")]
    NoUpstreamBody,
    #[error(transparent)]
    UpstreamRead(#[from] UpstreamReadFault),
    #[error(transparent)]
    Transport(#[from] UpstreamFailure),
}

impl StreamFault {
    pub fn code(&self) -> &'static str {
        match self {
            StreamFault::NoUpstreamBody => "no_upstream_body",
            StreamFault::UpstreamRead(_) => "upstream_read_fault",
            StreamFault::Transport(_) => "upstream_transport",
        }
    }
}

pub fn error_body(code: &str, message: &str) -> Bytes {
    let body = json!({
        "error": {
            "code": code,
            "message": message,
        }
    });
    Bytes::from(body.to_string())
}

impl From<ProviderError> for ProxyError {
    fn from(err: ProviderError) -> Self {
        Self::internal(err.to_string())
    }
}

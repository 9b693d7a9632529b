use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use visiongate_common::ProviderSettings;
use visiongate_protocol::{CanonicalRequest, ProviderKind, UpstreamPayload};

use crate::errors::{ProviderError, ProviderResult};
use crate::headers::{Headers, header_set};

/// Upstream stream body in arrival order. Dropping it releases the upstream
/// connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamReadFault>> + Send>>;

pub enum UpstreamBody {
    /// Fully buffered body (non-stream calls).
    Bytes(Bytes),
    Stream(ByteStream),
    /// The provider committed headers but declared no body at all.
    Empty,
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream(<opaque>)"),
            UpstreamBody::Empty => f.write_str("Empty"),
        }
    }
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub provider: ProviderKind,
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    pub is_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

impl UpstreamTransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamTransportErrorKind::Timeout => "timeout",
            UpstreamTransportErrorKind::ReadTimeout => "read_timeout",
            UpstreamTransportErrorKind::Connect => "connect",
            UpstreamTransportErrorKind::Dns => "dns",
            UpstreamTransportErrorKind::Tls => "tls",
            UpstreamTransportErrorKind::Other => "other",
        }
    }
}

/// The upstream call produced no HTTP response at all. Non-2xx responses are
/// not failures; they are forwarded as-is.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("upstream transport error ({}): {message}", .kind.as_str())]
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
}

/// I/O failure while reading an already-started upstream stream body.
#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream read fault: {message}")]
pub struct UpstreamReadFault {
    pub message: String,
}

impl UpstreamReadFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Maps a canonical request onto one provider's chat-completions endpoint.
///
/// Implementations only override the pieces that differ; the default methods
/// cover model resolution, bearer auth and request assembly.
pub trait VisionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn default_base_url(&self) -> &'static str;

    /// Last-resort model when neither the request nor configuration names one.
    fn fallback_model(&self) -> &'static str;

    fn build_payload(
        &self,
        req: &CanonicalRequest,
        settings: &ProviderSettings,
    ) -> UpstreamPayload;

    /// Provider-specific headers on top of auth and content negotiation.
    fn decorate_headers(&self, _settings: &ProviderSettings, _headers: &mut Headers) {}

    /// Whether the `thinking` switch reaches the upstream payload.
    fn supports_thinking(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn endpoint(&self, settings: &ProviderSettings) -> String {
        let base = settings
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .unwrap_or(self.default_base_url());
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn resolve_model(&self, req: &CanonicalRequest, settings: &ProviderSettings) -> String {
        non_blank(req.model.as_deref())
            .or_else(|| non_blank(settings.default_model.as_deref()))
            .unwrap_or(self.fallback_model())
            .to_string()
    }

    fn auth_header(&self, secret: &str) -> (String, String) {
        ("Authorization".to_string(), format!("Bearer {secret}"))
    }

    fn build_request(
        &self,
        req: &CanonicalRequest,
        settings: &ProviderSettings,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let payload = self.build_payload(req, settings);
        let body =
            serde_json::to_vec(&payload).map_err(|err| ProviderError::Other(err.to_string()))?;

        let mut headers = Headers::new();
        if let Some(secret) = non_blank(settings.api_key.as_deref()) {
            let (name, value) = self.auth_header(secret);
            header_set(&mut headers, name, value);
        }
        header_set(&mut headers, "Content-Type", "application/json");
        header_set(
            &mut headers,
            "Accept",
            if payload.stream {
                "text/event-stream"
            } else {
                "application/json"
            },
        );
        self.decorate_headers(settings, &mut headers);

        Ok(UpstreamHttpRequest {
            provider: self.kind(),
            url: self.endpoint(settings),
            headers,
            body: Bytes::from(body),
            is_stream: payload.stream,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use wreq::{Client, Method, Proxy};

use visiongate_common::GlobalConfig;
use visiongate_provider_core::{
    Headers, UpstreamBody, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    UpstreamReadFault, UpstreamTransportErrorKind, header_get,
};

pub type UpstreamSendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;

/// Performs exactly one upstream HTTP call. Implementations never retry.
pub trait UpstreamClient: Send + Sync {
    fn send(&self, req: UpstreamHttpRequest) -> UpstreamSendFuture<'_>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            proxy: global.proxy.clone(),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let proxy = normalize_proxy(config.proxy.clone());
        Ok(Self {
            client: build_client(&config, proxy.as_deref())?,
        })
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

// Only the connect phase is bounded.
fn build_client(config: &UpstreamClientConfig, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder().connect_timeout(config.connect_timeout);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send(&self, req: UpstreamHttpRequest) -> UpstreamSendFuture<'_> {
        Box::pin(async move {
            let mut builder = self.client.request(Method::POST, &req.url);
            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }
            builder = builder.body(req.body);

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp, req.is_stream).await
        })
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = resp.status().as_u16();
    let headers = headers_from_wreq(resp.headers());

    if !want_stream {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    if declares_empty_body(&headers) {
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Empty,
        });
    }

    let stream = resp
        .bytes_stream()
        .map(|item| item.map_err(|err| UpstreamReadFault::new(err.to_string())));

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(Box::pin(stream)),
    })
}

fn declares_empty_body(headers: &Headers) -> bool {
    header_get(headers, "content-length")
        .map(|value| value.trim() == "0")
        .unwrap_or(false)
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (k, v) in map {
        if let Ok(s) = v.to_str() {
            out.push((k.as_str().to_string(), s.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::Transport {
        kind,
        message: err.to_string(),
    }
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") {
            return UpstreamTransportErrorKind::ReadTimeout;
        }
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}

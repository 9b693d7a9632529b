use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};
use visiongate_common::GlobalConfig;
use visiongate_protocol::{CanonicalRequest, ProviderKind};
use visiongate_provider_core::{
    ProviderError, ProviderRegistry, ProviderResult, UpstreamFailure, UpstreamHttpResponse,
    VisionProvider,
};

use crate::upstream_client::UpstreamClient;

pub type UpstreamFuture =
    Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send>>;

/// One upstream call that has been prepared but not started.
///
/// Nothing goes on the wire until the call is awaited, so a caller can emit
/// its own early frames first.
pub struct PendingUpstreamCall {
    pub provider: ProviderKind,
    pub model: String,
    pub is_stream: bool,
    future: UpstreamFuture,
}

impl PendingUpstreamCall {
    pub fn new(
        provider: ProviderKind,
        model: String,
        is_stream: bool,
        future: UpstreamFuture,
    ) -> Self {
        Self {
            provider,
            model,
            is_stream,
            future,
        }
    }
}

impl fmt::Debug for PendingUpstreamCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpstreamCall")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("is_stream", &self.is_stream)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for PendingUpstreamCall {
    type Output = Result<UpstreamHttpResponse, UpstreamFailure>;
    type IntoFuture = UpstreamFuture;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

/// Chooses the provider for a canonical request and prepares its call.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ProviderRegistry,
    config: Arc<GlobalConfig>,
    client: Arc<dyn UpstreamClient>,
}

impl Dispatcher {
    pub fn new(
        registry: ProviderRegistry,
        config: Arc<GlobalConfig>,
        client: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            registry,
            config,
            client,
        }
    }

    pub fn select(&self, req: &CanonicalRequest) -> ProviderResult<Arc<dyn VisionProvider>> {
        let kind = req.provider.unwrap_or(self.config.default_provider);
        self.registry
            .get(kind)
            .ok_or(ProviderError::NotRegistered(kind.as_str()))
    }

    /// Builds the provider request. Exactly one upstream call results from
    /// awaiting the returned value; there are no retries or fallbacks.
    pub fn dispatch(
        &self,
        req: &CanonicalRequest,
        trace_id: &str,
    ) -> ProviderResult<PendingUpstreamCall> {
        let provider = self.select(req)?;
        let settings = self.config.providers.get(provider.kind());
        let model = provider.resolve_model(req, settings);
        let upstream_req = provider.build_request(req, settings)?;

        if req.thinking.is_some() && !provider.supports_thinking() {
            debug!(
                event = "thinking_ignored",
                trace_id = %trace_id,
                provider = %provider.name(),
                thinking = ?req.thinking,
            );
        }

        info!(
            event = "upstream_dispatched",
            trace_id = %trace_id,
            provider = %provider.name(),
            model = %model,
            url = %upstream_req.url,
            is_stream = upstream_req.is_stream,
            images = req.images.len(),
        );

        let client = self.client.clone();
        let is_stream = upstream_req.is_stream;
        let future: UpstreamFuture = Box::pin(async move { client.send(upstream_req).await });
        Ok(PendingUpstreamCall::new(provider.kind(), model, is_stream, future))
    }
}

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;
use visiongate_common::GlobalConfig;
use visiongate_provider_core::ProviderRegistry;
use visiongate_provider_impl::build_registry;

use crate::dispatch::Dispatcher;
use crate::error::ProxyError;
use crate::normalize::{InboundPayload, NormalizeLimits, StreamHints, normalize};
use crate::respond::{JsonReply, respond_json};
use crate::synth::StreamSynthesizer;
use crate::upstream_client::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};

pub enum EngineResponse {
    Json(JsonReply),
    /// Outbound event stream; the status is always 200 once this is returned.
    Stream(mpsc::Receiver<Bytes>),
}

/// The request pipeline: normalize, dispatch, then respond or synthesize.
///
/// Holds only read-only state, so one instance is shared by all requests.
#[derive(Clone)]
pub struct VisionEngine {
    config: Arc<GlobalConfig>,
    dispatcher: Dispatcher,
    synthesizer: StreamSynthesizer,
}

impl VisionEngine {
    pub fn new(
        config: Arc<GlobalConfig>,
        registry: ProviderRegistry,
        client: Arc<dyn UpstreamClient>,
    ) -> Self {
        let synthesizer = StreamSynthesizer::new(config.stream.clone());
        Self {
            dispatcher: Dispatcher::new(registry, config.clone(), client),
            synthesizer,
            config,
        }
    }

    /// Built-in providers over the given client.
    pub fn with_client(config: Arc<GlobalConfig>, client: Arc<dyn UpstreamClient>) -> Self {
        Self::new(config, build_registry(), client)
    }

    /// Built-in providers over a real `wreq` client.
    pub fn from_config(config: GlobalConfig) -> Result<Self, wreq::Error> {
        let client = WreqUpstreamClient::new(UpstreamClientConfig::from_global(&config))?;
        Ok(Self::with_client(Arc::new(config), Arc::new(client)))
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn limits(&self) -> NormalizeLimits {
        NormalizeLimits {
            max_image_bytes: self.config.max_image_bytes,
        }
    }

    /// Runs one inbound request. Every error returned here happens before any
    /// upstream call and before any outbound byte.
    pub async fn handle(
        &self,
        payload: InboundPayload,
        hints: StreamHints,
        trace_id: &str,
    ) -> Result<EngineResponse, ProxyError> {
        let req = normalize(payload, hints, &self.limits()).inspect_err(|err| {
            warn!(
                event = "normalize_failed",
                trace_id = %trace_id,
                code = err.code(),
                error = %err,
            );
        })?;

        let call = self.dispatcher.dispatch(&req, trace_id)?;
        if call.is_stream {
            Ok(EngineResponse::Stream(
                self.synthesizer.spawn(call, trace_id.to_string()),
            ))
        } else {
            Ok(EngineResponse::Json(respond_json(call, trace_id).await))
        }
    }
}

use visiongate_common::ProviderSettings;
use visiongate_protocol::{CanonicalRequest, ProviderKind, ThinkingConfig, UpstreamPayload};
use visiongate_provider_core::{VisionProvider, build_messages};

const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const ZHIPU_FALLBACK_MODEL: &str = "glm-4.5v";

/// Zhipu BigModel chat completions. The default provider and the only one
/// that understands the `thinking` switch.
#[derive(Debug, Default)]
pub struct ZhipuProvider;

impl ZhipuProvider {
    pub fn new() -> Self {
        Self
    }
}

impl VisionProvider for ZhipuProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zhipu
    }

    fn default_base_url(&self) -> &'static str {
        DEFAULT_BASE_URL
    }

    fn fallback_model(&self) -> &'static str {
        ZHIPU_FALLBACK_MODEL
    }

    fn supports_thinking(&self) -> bool {
        true
    }

    fn build_payload(
        &self,
        req: &CanonicalRequest,
        settings: &ProviderSettings,
    ) -> UpstreamPayload {
        UpstreamPayload {
            model: self.resolve_model(req, settings),
            messages: build_messages(req),
            stream: req.wants_stream,
            // Unset stays off the wire; never sent as null.
            thinking: req.thinking.map(|kind| ThinkingConfig { kind }),
        }
    }
}

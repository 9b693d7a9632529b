use visiongate_common::ProviderSettings;
use visiongate_protocol::{CanonicalRequest, ProviderKind, UpstreamPayload};
use visiongate_provider_core::{Headers, VisionProvider, build_messages, header_set};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_FALLBACK_MODEL: &str = "z-ai/glm-4.5v";

const REFERER_HEADER: &str = "HTTP-Referer";
const TITLE_HEADER: &str = "X-Title";

/// OpenRouter chat completions with app attribution headers.
#[derive(Debug, Default)]
pub struct OpenRouterProvider;

impl OpenRouterProvider {
    pub fn new() -> Self {
        Self
    }
}

impl VisionProvider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn default_base_url(&self) -> &'static str {
        DEFAULT_BASE_URL
    }

    fn fallback_model(&self) -> &'static str {
        OPENROUTER_FALLBACK_MODEL
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
            thinking: None,
        }
    }

    fn decorate_headers(&self, settings: &ProviderSettings, headers: &mut Headers) {
        let attribution = [
            (REFERER_HEADER, settings.referer.as_deref()),
            (TITLE_HEADER, settings.title.as_deref()),
        ];
        for (name, value) in attribution {
            if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
                header_set(headers, name, value);
            }
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Zhipu,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Zhipu, ProviderKind::OpenRouter];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("zhipu")
            || value.eq_ignore_ascii_case("glm")
            || value.eq_ignore_ascii_case("a")
        {
            Some(ProviderKind::Zhipu)
        } else if value.eq_ignore_ascii_case("openrouter")
            || value.eq_ignore_ascii_case("or")
            || value.eq_ignore_ascii_case("b")
        {
            Some(ProviderKind::OpenRouter)
        } else {
            None
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Low,
    High,
    Auto,
}

impl DetailLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(DetailLevel::Low),
            "high" => Some(DetailLevel::High),
            "auto" => Some(DetailLevel::Auto),
            _ => None,
        }
    }
}

/// Extended-thinking switch. `Option<ThinkingMode>::None` is the "unset" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    Enabled,
    Disabled,
}

impl ThinkingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" | "enable" | "true" | "on" => Some(ThinkingMode::Enabled),
            "disabled" | "disable" | "false" | "off" => Some(ThinkingMode::Disabled),
            _ => None,
        }
    }
}

/// One image reference, either fetched by the provider or carried inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Url(String),
    DataUri(String),
}

impl ImageRef {
    /// Accepts `http(s)://` URLs and `data:image/...` URIs; anything else
    /// (including blank input) is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("data:image/") {
            return Some(ImageRef::DataUri(value.to_string()));
        }
        if lower.starts_with("https://") || lower.starts_with("http://") {
            return Some(ImageRef::Url(value.to_string()));
        }
        None
    }

    pub fn inline(media_type: &str, base64_data: &str) -> Self {
        ImageRef::DataUri(format!("data:{media_type};base64,{base64_data}"))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Url(url) => url,
            ImageRef::DataUri(uri) => uri,
        }
    }
}

/// The normalized form of one inbound vision request.
///
/// Built once per inbound call by the normalizer and only ever borrowed
/// afterwards; nothing downstream mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    /// Empty means image-only.
    pub prompt_text: String,
    pub images: Vec<ImageRef>,
    pub detail: Option<DetailLevel>,
    pub thinking: Option<ThinkingMode>,
    pub wants_stream: bool,
}

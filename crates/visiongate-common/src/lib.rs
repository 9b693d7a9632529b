use std::time::Duration;

use serde::{Deserialize, Serialize};
use visiongate_protocol::ProviderKind;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8790;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("invalid global config field {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    #[error("config file: {0}")]
    File(#[from] serde_json::Error),
}

/// Static per-provider settings. Every field is optional; adapters fall back
/// to their own built-in constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Attribution referrer; only sent by providers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Attribution title; only sent by providers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ProviderSettings {
    pub fn overlay(&mut self, other: ProviderSettings) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.default_model.is_some() {
            self.default_model = other.default_model;
        }
        if other.referer.is_some() {
            self.referer = other.referer;
        }
        if other.title.is_some() {
            self.title = other.title;
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub zhipu: ProviderSettings,
    #[serde(default)]
    pub openrouter: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Zhipu => &self.zhipu,
            ProviderKind::OpenRouter => &self.openrouter,
        }
    }

    pub fn overlay(&mut self, other: ProvidersConfig) {
        self.zhipu.overlay(other.zhipu);
        self.openrouter.overlay(other.openrouter);
    }
}

/// Timing constants for the stream synthesizer.
///
/// `tail_ceiling` and `estimated_total_ms` are fixed configuration, not a
/// latency model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTiming {
    pub heartbeat_ms: u64,
    pub soft_tick_ms: u64,
    pub soft_min_interval_ms: u64,
    pub soft_threshold: f64,
    pub tail_ceiling: f64,
    pub estimated_total_ms: u64,
}

impl StreamTiming {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn soft_tick(&self) -> Duration {
        Duration::from_millis(self.soft_tick_ms)
    }

    pub fn soft_min_interval(&self) -> Duration {
        Duration::from_millis(self.soft_min_interval_ms)
    }

    pub fn estimated_total(&self) -> Duration {
        Duration::from_millis(self.estimated_total_ms)
    }

    fn validate(&self) -> Result<(), GlobalConfigError> {
        if self.heartbeat_ms == 0 {
            return Err(GlobalConfigError::Invalid {
                field: "stream.heartbeat_ms",
                reason: "must be positive",
            });
        }
        if self.soft_tick_ms == 0 {
            return Err(GlobalConfigError::Invalid {
                field: "stream.soft_tick_ms",
                reason: "must be positive",
            });
        }
        if self.estimated_total_ms == 0 {
            return Err(GlobalConfigError::Invalid {
                field: "stream.estimated_total_ms",
                reason: "must be positive",
            });
        }
        if !(self.tail_ceiling > 0.0 && self.tail_ceiling < 1.0) {
            return Err(GlobalConfigError::Invalid {
                field: "stream.tail_ceiling",
                reason: "must be within (0, 1)",
            });
        }
        if !(self.soft_threshold >= 0.0 && self.soft_threshold < 1.0) {
            return Err(GlobalConfigError::Invalid {
                field: "stream.soft_threshold",
                reason: "must be within [0, 1)",
            });
        }
        Ok(())
    }
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            heartbeat_ms: 15_000,
            soft_tick_ms: 400,
            soft_min_interval_ms: 1_000,
            soft_threshold: 0.02,
            tail_ceiling: 0.95,
            estimated_total_ms: 12_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamTimingPatch {
    pub heartbeat_ms: Option<u64>,
    pub soft_tick_ms: Option<u64>,
    pub soft_min_interval_ms: Option<u64>,
    pub soft_threshold: Option<f64>,
    pub tail_ceiling: Option<f64>,
    pub estimated_total_ms: Option<u64>,
}

impl StreamTimingPatch {
    pub fn overlay(&mut self, other: StreamTimingPatch) {
        if other.heartbeat_ms.is_some() {
            self.heartbeat_ms = other.heartbeat_ms;
        }
        if other.soft_tick_ms.is_some() {
            self.soft_tick_ms = other.soft_tick_ms;
        }
        if other.soft_min_interval_ms.is_some() {
            self.soft_min_interval_ms = other.soft_min_interval_ms;
        }
        if other.soft_threshold.is_some() {
            self.soft_threshold = other.soft_threshold;
        }
        if other.tail_ceiling.is_some() {
            self.tail_ceiling = other.tail_ceiling;
        }
        if other.estimated_total_ms.is_some() {
            self.estimated_total_ms = other.estimated_total_ms;
        }
    }

    fn apply(self, timing: &mut StreamTiming) {
        if let Some(value) = self.heartbeat_ms {
            timing.heartbeat_ms = value;
        }
        if let Some(value) = self.soft_tick_ms {
            timing.soft_tick_ms = value;
        }
        if let Some(value) = self.soft_min_interval_ms {
            timing.soft_min_interval_ms = value;
        }
        if let Some(value) = self.soft_threshold {
            timing.soft_threshold = value;
        }
        if let Some(value) = self.tail_ceiling {
            timing.tail_ceiling = value;
        }
        if let Some(value) = self.estimated_total_ms {
            timing.estimated_total_ms = value;
        }
    }
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > config file > defaults. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    pub default_provider: ProviderKind,
    pub max_image_bytes: usize,
    pub providers: ProvidersConfig,
    pub stream: StreamTiming,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            proxy: None,
            default_provider: ProviderKind::Zhipu,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            providers: ProvidersConfig::default(),
            stream: StreamTiming::default(),
        }
    }
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfigPatch {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub default_provider: Option<ProviderKind>,
    #[serde(default)]
    pub max_image_bytes: Option<usize>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub stream: StreamTimingPatch,
}

impl GlobalConfigPatch {
    pub fn from_json(raw: &str) -> Result<Self, GlobalConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.default_provider.is_some() {
            self.default_provider = other.default_provider;
        }
        if other.max_image_bytes.is_some() {
            self.max_image_bytes = other.max_image_bytes;
        }
        self.providers.overlay(other.providers);
        self.stream.overlay(other.stream);
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        let defaults = GlobalConfig::default();
        let mut stream = defaults.stream;
        self.stream.apply(&mut stream);
        stream.validate()?;

        let max_image_bytes = self.max_image_bytes.unwrap_or(defaults.max_image_bytes);
        if max_image_bytes == 0 {
            return Err(GlobalConfigError::Invalid {
                field: "max_image_bytes",
                reason: "must be positive",
            });
        }

        Ok(GlobalConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            proxy: self
                .proxy
                .map(|proxy| proxy.trim().to_string())
                .filter(|proxy| !proxy.is_empty()),
            default_provider: self.default_provider.unwrap_or(defaults.default_provider),
            max_image_bytes,
            providers: self.providers,
            stream,
        })
    }
}

use std::path::PathBuf;

use clap::Parser;
use visiongate_common::{GlobalConfigPatch, ProviderSettings, ProvidersConfig, StreamTimingPatch};
use visiongate_protocol::ProviderKind;

/// Every flag can also come from its `VISIONGATE_*` environment variable;
/// an explicit flag wins over the environment, which wins over `--config`.
#[derive(Parser, Debug)]
#[command(name = "visiongate", version, about = "Streaming vision inference gateway")]
pub(crate) struct Cli {
    /// JSON config file, lowest-precedence layer above the defaults.
    #[arg(long, env = "VISIONGATE_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, env = "VISIONGATE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "VISIONGATE_PORT")]
    pub(crate) port: Option<u16>,
    /// Outbound proxy for upstream calls.
    #[arg(long, env = "VISIONGATE_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long, env = "VISIONGATE_DEFAULT_PROVIDER", value_parser = parse_provider)]
    pub(crate) default_provider: Option<ProviderKind>,
    #[arg(long, env = "VISIONGATE_MAX_IMAGE_BYTES")]
    pub(crate) max_image_bytes: Option<usize>,

    #[arg(long, env = "VISIONGATE_ZHIPU_API_KEY", hide_env_values = true)]
    pub(crate) zhipu_api_key: Option<String>,
    #[arg(long, env = "VISIONGATE_ZHIPU_BASE_URL")]
    pub(crate) zhipu_base_url: Option<String>,
    #[arg(long, env = "VISIONGATE_ZHIPU_MODEL")]
    pub(crate) zhipu_model: Option<String>,

    #[arg(long, env = "VISIONGATE_OPENROUTER_API_KEY", hide_env_values = true)]
    pub(crate) openrouter_api_key: Option<String>,
    #[arg(long, env = "VISIONGATE_OPENROUTER_BASE_URL")]
    pub(crate) openrouter_base_url: Option<String>,
    #[arg(long, env = "VISIONGATE_OPENROUTER_MODEL")]
    pub(crate) openrouter_model: Option<String>,
    /// Sent as `HTTP-Referer`.
    #[arg(long, env = "VISIONGATE_OPENROUTER_REFERER")]
    pub(crate) openrouter_referer: Option<String>,
    /// Sent as `X-Title`.
    #[arg(long, env = "VISIONGATE_OPENROUTER_TITLE")]
    pub(crate) openrouter_title: Option<String>,

    #[arg(long, env = "VISIONGATE_HEARTBEAT_MS")]
    pub(crate) heartbeat_ms: Option<u64>,
    #[arg(long, env = "VISIONGATE_ESTIMATED_TOTAL_MS")]
    pub(crate) estimated_total_ms: Option<u64>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host,
            port: self.port,
            proxy: self.proxy,
            default_provider: self.default_provider,
            max_image_bytes: self.max_image_bytes,
            providers: ProvidersConfig {
                zhipu: ProviderSettings {
                    base_url: self.zhipu_base_url,
                    api_key: self.zhipu_api_key,
                    default_model: self.zhipu_model,
                    referer: None,
                    title: None,
                },
                openrouter: ProviderSettings {
                    base_url: self.openrouter_base_url,
                    api_key: self.openrouter_api_key,
                    default_model: self.openrouter_model,
                    referer: self.openrouter_referer,
                    title: self.openrouter_title,
                },
            },
            stream: StreamTimingPatch {
                heartbeat_ms: self.heartbeat_ms,
                estimated_total_ms: self.estimated_total_ms,
                ..StreamTimingPatch::default()
            },
        }
    }
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    ProviderKind::parse(value).ok_or_else(|| {
        format!("unknown provider `{value}` (expected zhipu or openrouter)")
    })
}

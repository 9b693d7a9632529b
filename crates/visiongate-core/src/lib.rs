pub mod dispatch;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod respond;
pub mod synth;
pub mod upstream_client;

pub use dispatch::{Dispatcher, PendingUpstreamCall, UpstreamFuture};
pub use engine::{EngineResponse, VisionEngine};
pub use error::{ProxyError, StreamFault, error_body};
pub use normalize::{
    FormPayload, InboundPayload, NormalizeError, NormalizeLimits, StreamHints, UploadedFile,
    normalize, parse_stream_query,
};
pub use respond::{JsonReply, respond_json};
pub use synth::{StreamSession, StreamSynthesizer};
pub use upstream_client::{
    UpstreamClient, UpstreamClientConfig, UpstreamSendFuture, WreqUpstreamClient,
};

//! Wire and model types shared by every visiongate crate.
//!
//! `canonical` holds the provider-agnostic request produced by the normalizer,
//! `payload` the OpenAI-compatible body sent upstream, and `frame` the
//! synthetic SSE events the gateway interleaves with upstream bytes.

pub mod canonical;
pub mod frame;
pub mod payload;

pub use canonical::{CanonicalRequest, DetailLevel, ImageRef, ProviderKind, ThinkingMode};
pub use frame::{
    CompleteFrame, ErrorFrame, Frame, HeartbeatFrame, Phase, ProgressFrame, percent_of,
};
pub use payload::{ChatMessage, ContentPart, ImageUrlPart, Role, ThinkingConfig, UpstreamPayload};

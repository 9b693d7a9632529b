//! Built-in upstream vision providers.
//!
//! This crate does not perform network IO. It builds `UpstreamHttpRequest`
//! values for the dispatcher to send.

mod providers;
mod registry;

pub use providers::openrouter::{OPENROUTER_FALLBACK_MODEL, OpenRouterProvider};
pub use providers::zhipu::{ZHIPU_FALLBACK_MODEL, ZhipuProvider};
pub use registry::{build_registry, register_builtin_providers};

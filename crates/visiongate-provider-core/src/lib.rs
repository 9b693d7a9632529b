//! Provider abstractions for visiongate.
//!
//! This crate does not depend on axum or any concrete HTTP client. Adapters
//! turn a `CanonicalRequest` into an `UpstreamHttpRequest`; a higher layer
//! performs the IO.

pub mod content;
pub mod errors;
pub mod headers;
pub mod provider;
pub mod registry;

pub use content::build_messages;
pub use errors::{ProviderError, ProviderResult};
pub use headers::{Headers, header_get, header_set};
pub use provider::{
    ByteStream, UpstreamBody, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    UpstreamReadFault, UpstreamTransportErrorKind, VisionProvider,
};
pub use registry::ProviderRegistry;

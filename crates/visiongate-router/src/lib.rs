//! HTTP surface for visiongate.
//!
//! Decodes inbound requests into `InboundPayload`s, hands them to the
//! `VisionEngine` and turns its results into axum responses.

mod vision;

pub use vision::{REQUEST_ID_HEADER, RequestTraceId, vision_router};

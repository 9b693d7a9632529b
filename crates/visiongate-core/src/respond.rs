use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;
use tracing::{info, warn};
use visiongate_provider_core::{UpstreamBody, UpstreamReadFault};

use crate::dispatch::PendingUpstreamCall;
use crate::error::error_body;

/// A complete JSON reply for the non-stream path.
#[derive(Debug, Clone)]
pub struct JsonReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Awaits the single upstream call and forwards its JSON body with the
/// upstream status. Bodies that do not parse as JSON are replaced by a
/// structured error that keeps the upstream status.
pub async fn respond_json(call: PendingUpstreamCall, trace_id: &str) -> JsonReply {
    let provider = call.provider;
    let model = call.model.clone();
    let response = match call.await {
        Ok(response) => response,
        Err(failure) => {
            warn!(
                event = "upstream_failed",
                trace_id = %trace_id,
                provider = %provider,
                model = %model,
                error = %failure,
            );
            return JsonReply {
                status: StatusCode::BAD_GATEWAY,
                body: error_body("upstream_transport", &failure.to_string()),
            };
        }
    };

    info!(
        event = "upstream_headers",
        trace_id = %trace_id,
        provider = %provider,
        model = %model,
        status = response.status,
    );
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let body = match collect_body(response.body).await {
        Ok(body) => body,
        Err(fault) => {
            return JsonReply {
                status: StatusCode::BAD_GATEWAY,
                body: error_body("upstream_read_fault", &fault.to_string()),
            };
        }
    };

    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(_) => JsonReply { status, body },
        Err(err) => {
            warn!(
                event = "upstream_invalid_json",
                trace_id = %trace_id,
                provider = %provider,
                status = status.as_u16(),
                error = %err,
            );
            JsonReply {
                status,
                body: error_body(
                    "upstream_invalid_json",
                    &format!("upstream body is not valid JSON: {err}"),
                ),
            }
        }
    }
}

async fn collect_body(body: UpstreamBody) -> Result<Bytes, UpstreamReadFault> {
    match body {
        UpstreamBody::Bytes(bytes) => Ok(bytes),
        UpstreamBody::Empty => Ok(Bytes::new()),
        UpstreamBody::Stream(mut stream) => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            Ok(buf.freeze())
        }
    }
}

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Extension, FromRequest, Multipart, RawQuery, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use visiongate_core::{
    EngineResponse, FormPayload, InboundPayload, NormalizeError, ProxyError, StreamHints,
    UploadedFile, VisionEngine, parse_stream_query,
};

pub const REQUEST_ID_HEADER: &str = "x-visiongate-request-id";

/// Room for multipart framing and text fields around the largest image.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

#[derive(Clone)]
struct VisionState {
    engine: Arc<VisionEngine>,
}

#[derive(Debug, Clone)]
pub struct RequestTraceId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Json,
    Form,
}

impl Encoding {
    fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Form => "multipart",
        }
    }
}

pub fn vision_router(engine: Arc<VisionEngine>) -> Router {
    // Inline base64 is a third larger than the bytes it carries.
    let body_limit = engine
        .limits()
        .max_image_bytes
        .saturating_mul(2)
        .saturating_add(BODY_LIMIT_SLACK);
    let state = VisionState { engine };

    Router::new()
        .route("/v1/vision", post(vision))
        .route("/v1/vision/stream", post(vision_stream))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn trace_request(mut req: Request, next: Next) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();
    req.extensions_mut()
        .insert(RequestTraceId(trace_id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn vision(
    State(state): State<VisionState>,
    Extension(trace_id): Extension<RequestTraceId>,
    RawQuery(query): RawQuery,
    req: Request,
) -> Response {
    let hints = StreamHints {
        path_suffix: false,
        query: parse_stream_query(query.as_deref()),
    };
    handle(state, trace_id, hints, req).await
}

async fn vision_stream(
    State(state): State<VisionState>,
    Extension(trace_id): Extension<RequestTraceId>,
    RawQuery(query): RawQuery,
    req: Request,
) -> Response {
    let hints = StreamHints {
        path_suffix: true,
        query: parse_stream_query(query.as_deref()),
    };
    handle(state, trace_id, hints, req).await
}

async fn handle(
    state: VisionState,
    trace_id: RequestTraceId,
    hints: StreamHints,
    req: Request,
) -> Response {
    let started_at = Instant::now();
    let trace_id = trace_id.0;
    let path = req.uri().path().to_string();

    let encoding = match detect_encoding(req.headers()) {
        Ok(encoding) => encoding,
        Err(err) => return error_response(err),
    };
    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        path = %path,
        encoding = encoding.as_str(),
        path_stream = hints.path_suffix,
        query_stream = ?hints.query,
    );

    let payload = match read_payload(encoding, req).await {
        Ok(payload) => payload,
        Err(err) => return error_response(err),
    };

    let response = match state.engine.handle(payload, hints, &trace_id).await {
        Ok(EngineResponse::Json(reply)) => json_response(reply.status, reply.body),
        Ok(EngineResponse::Stream(rx)) => sse_response(rx),
        Err(err) => error_response(err),
    };

    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis(),
        is_stream = is_event_stream(response.headers()),
    );
    response
}

fn detect_encoding(headers: &HeaderMap) -> Result<Encoding, ProxyError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(Encoding::Json);
    };
    let value = value
        .to_str()
        .map_err(|_| malformed("content-type header is not valid text"))?;
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() || essence == "application/json" || essence.ends_with("+json") {
        Ok(Encoding::Json)
    } else if essence == "multipart/form-data" {
        Ok(Encoding::Form)
    } else {
        Err(malformed(format!(
            "content type `{essence}` is not supported; use application/json or multipart/form-data"
        )))
    }
}

async fn read_payload(encoding: Encoding, req: Request) -> Result<InboundPayload, ProxyError> {
    match encoding {
        Encoding::Json => {
            let body = Bytes::from_request(req, &())
                .await
                .map_err(|rejection| {
                    ProxyError::json(rejection.status(), "body_rejected", rejection.body_text())
                })?;
            Ok(InboundPayload::Json(body))
        }
        Encoding::Form => {
            let multipart = Multipart::from_request(req, &())
                .await
                .map_err(|rejection| {
                    ProxyError::json(rejection.status(), "body_rejected", rejection.body_text())
                })?;
            Ok(InboundPayload::Form(read_form(multipart).await?))
        }
    }
}

/// Collects text parts in order. The part named `image` (or `file`), or any
/// part carrying a file name, is the upload; a second one is rejected.
async fn read_form(mut multipart: Multipart) -> Result<FormPayload, ProxyError> {
    let mut form = FormPayload::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() || name == "image" || name == "file" {
            if form.file.is_some() {
                return Err(malformed("only one uploaded file is accepted"));
            }
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            form.file = Some(UploadedFile {
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.push((name, value));
        }
    }
    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ProxyError {
    ProxyError::json(err.status(), "malformed_input", err.body_text())
}

fn malformed(message: impl Into<String>) -> ProxyError {
    NormalizeError::MalformedInput(message.into()).into()
}

fn error_response(err: ProxyError) -> Response {
    json_response(err.status, err.body)
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn sse_response(rx: tokio::sync::mpsc::Receiver<Bytes>) -> Response {
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
        })
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("text/event-stream"))
        .unwrap_or(false)
}

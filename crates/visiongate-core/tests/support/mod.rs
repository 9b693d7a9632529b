#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use visiongate_common::{GlobalConfig, StreamTiming};
use visiongate_core::{UpstreamClient, UpstreamSendFuture, VisionEngine};
use visiongate_protocol::Frame;
use visiongate_provider_core::{
    ByteStream, UpstreamBody, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    UpstreamReadFault,
};

pub struct ScriptedReply {
    pub headers_after: Duration,
    pub response: Result<UpstreamHttpResponse, UpstreamFailure>,
}

impl ScriptedReply {
    pub fn ok(status: u16, body: UpstreamBody) -> Self {
        Self {
            headers_after: Duration::ZERO,
            response: Ok(UpstreamHttpResponse {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body,
            }),
        }
    }

    pub fn json(status: u16, body: &'static str) -> Self {
        Self::ok(status, UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())))
    }

    pub fn failing(failure: UpstreamFailure) -> Self {
        Self {
            headers_after: Duration::ZERO,
            response: Err(failure),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.headers_after = delay;
        self
    }
}

/// Plays back canned responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<UpstreamHttpRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<UpstreamHttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl UpstreamClient for ScriptedClient {
    fn send(&self, req: UpstreamHttpRequest) -> UpstreamSendFuture<'_> {
        self.requests.lock().unwrap().push(req);
        let reply = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            let reply = reply.expect("unexpected upstream call");
            tokio::time::sleep(reply.headers_after).await;
            reply.response
        })
    }
}

/// Body whose items arrive after the given delays (each relative to the
/// previous item), ending `tail` after the last one.
pub fn timed_body(items: Vec<(u64, Result<Bytes, UpstreamReadFault>)>, tail: u64) -> UpstreamBody {
    let state = (VecDeque::from(items), Some(tail));
    let stream: ByteStream = Box::pin(futures_util::stream::unfold(
        state,
        |(mut items, tail)| async move {
            match items.pop_front() {
                Some((delay, item)) => {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Some((item, (items, tail)))
                }
                None => {
                    if let Some(tail) = tail {
                        tokio::time::sleep(Duration::from_millis(tail)).await;
                    }
                    None
                }
            }
        },
    ));
    UpstreamBody::Stream(stream)
}

pub fn engine(client: Arc<ScriptedClient>, timing: StreamTiming) -> VisionEngine {
    let config = GlobalConfig {
        stream: timing,
        ..GlobalConfig::default()
    };
    VisionEngine::with_client(Arc::new(config), client)
}

/// One outbound item, either a gateway frame or relayed upstream bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Frame(Frame),
    Passthrough(Bytes),
}

pub async fn drain(mut rx: mpsc::Receiver<Bytes>) -> Vec<Item> {
    let mut items = Vec::new();
    while let Some(chunk) = rx.recv().await {
        items.push(classify(chunk));
    }
    items
}

pub fn classify(chunk: Bytes) -> Item {
    match Frame::decode(&chunk) {
        Some(frame) => Item::Frame(frame),
        None => Item::Passthrough(chunk),
    }
}

/// Short label per item, e.g. `progress:queued`, `heartbeat`, `bytes`.
pub fn label(item: &Item) -> String {
    match item {
        Item::Frame(Frame::Progress(frame)) => {
            let phase = serde_json::to_value(frame.phase).unwrap();
            format!("progress:{}", phase.as_str().unwrap())
        }
        Item::Frame(frame) => frame.event_name().to_string(),
        Item::Passthrough(_) => "bytes".to_string(),
    }
}

pub fn labels(items: &[Item]) -> Vec<String> {
    items.iter().map(label).collect()
}

//! Progress-frame synthesis around a streamed upstream response.
//!
//! One spawned task owns the outbound sender. Timers, upstream chunks and
//! cancellation are all observed from a single `select!` loop, so every byte
//! written downstream is written by that task in program order.

mod session;

use std::future::IntoFuture;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, warn};
use visiongate_common::StreamTiming;
use visiongate_protocol::{
    CompleteFrame, ErrorFrame, Frame, HeartbeatFrame, Phase, ProgressFrame, ProviderKind,
};
use visiongate_provider_core::{ByteStream, UpstreamBody, UpstreamReadFault};

use crate::dispatch::PendingUpstreamCall;
use crate::error::StreamFault;

pub use session::StreamSession;

pub const QUEUED_FRACTION: f64 = 0.05;
pub const SELECTING_PROVIDER_FRACTION: f64 = 0.10;
pub const HEADERS_FLOOR_FRACTION: f64 = 1.0 / 3.0;
pub const FINALIZE_FRACTION: f64 = 0.99;

const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct StreamSynthesizer {
    timing: StreamTiming,
}

impl StreamSynthesizer {
    pub fn new(timing: StreamTiming) -> Self {
        Self { timing }
    }

    /// Starts the session task and returns the outbound byte stream. Dropping
    /// the receiver cancels the task together with its timers and the
    /// upstream read.
    pub fn spawn(&self, call: PendingUpstreamCall, trace_id: String) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(OUTBOUND_CHANNEL_CAPACITY);
        let timing = self.timing.clone();
        tokio::spawn(async move {
            let provider = call.provider;
            let model = call.model.clone();
            let mut session = StreamSession::new(&timing, Instant::now());
            let outcome = run_phases(&mut session, &timing, call, &tx, &trace_id)
                .await
                .unwrap_or_else(|Disconnected| Outcome::Cancelled);
            let elapsed_ms = millis(session.elapsed(Instant::now()));
            match outcome {
                Outcome::Finalized => {
                    info!(
                        event = "stream_finalized",
                        trace_id = %trace_id,
                        provider = %provider,
                        model = %model,
                        elapsed_ms,
                    );
                }
                Outcome::Errored(fault) => {
                    warn!(
                        event = "stream_errored",
                        trace_id = %trace_id,
                        provider = %provider,
                        model = %model,
                        code = fault.code(),
                        error = %fault,
                        elapsed_ms,
                    );
                    let frame = Frame::Error(ErrorFrame {
                        code: fault.code().to_string(),
                        message: fault.to_string(),
                    });
                    let _ = tx.send(frame.encode()).await;
                }
                Outcome::Cancelled => {
                    info!(
                        event = "stream_cancelled",
                        trace_id = %trace_id,
                        provider = %provider,
                        model = %model,
                        elapsed_ms,
                    );
                }
            }
        });
        rx
    }
}

enum Outcome {
    Finalized,
    Errored(StreamFault),
    Cancelled,
}

/// Downstream receiver is gone.
struct Disconnected;

async fn send(tx: &mpsc::Sender<Bytes>, bytes: Bytes) -> Result<(), Disconnected> {
    tx.send(bytes).await.map_err(|_| Disconnected)
}

async fn send_progress(
    tx: &mpsc::Sender<Bytes>,
    session: &mut StreamSession,
    fraction: f64,
    phase: Phase,
    fill: impl FnOnce(&mut ProgressFrame),
) -> Result<(), Disconnected> {
    let fraction = session.advance_to(fraction, Instant::now());
    let mut frame = ProgressFrame::new(fraction, phase);
    fill(&mut frame);
    send(tx, Frame::Progress(frame).encode()).await
}

async fn run_phases(
    session: &mut StreamSession,
    timing: &StreamTiming,
    call: PendingUpstreamCall,
    tx: &mpsc::Sender<Bytes>,
    trace_id: &str,
) -> Result<Outcome, Disconnected> {
    let provider: ProviderKind = call.provider;
    let model = call.model.clone();

    send_progress(tx, session, QUEUED_FRACTION, Phase::Queued, |_| {}).await?;
    send_progress(
        tx,
        session,
        SELECTING_PROVIDER_FRACTION,
        Phase::SelectingProvider,
        |frame| frame.provider = Some(provider.to_string()),
    )
    .await?;

    let response = tokio::select! {
        biased;
        _ = tx.closed() => return Err(Disconnected),
        result = call.into_future() => result,
    };
    let response = match response {
        Ok(response) => response,
        Err(failure) => return Ok(Outcome::Errored(failure.into())),
    };

    let ttfb_ms = millis(session.elapsed(Instant::now()));
    info!(
        event = "upstream_headers",
        trace_id = %trace_id,
        provider = %provider,
        model = %model,
        status = response.status,
        ttfb_ms,
    );
    let status = response.status;
    send_progress(
        tx,
        session,
        HEADERS_FLOOR_FRACTION,
        Phase::HeadersReceived,
        |frame| {
            frame.ttfb_ms = Some(ttfb_ms);
            frame.upstream_status = Some(status);
        },
    )
    .await?;

    let body: ByteStream = match response.body {
        UpstreamBody::Stream(stream) => stream,
        UpstreamBody::Bytes(bytes) if !bytes.is_empty() => {
            Box::pin(futures_util::stream::iter([Ok::<_, UpstreamReadFault>(bytes)]))
        }
        UpstreamBody::Bytes(_) | UpstreamBody::Empty => {
            return Ok(Outcome::Errored(StreamFault::NoUpstreamBody));
        }
    };

    if let Some(fault) = relay(session, timing, body, tx).await? {
        return Ok(Outcome::Errored(fault));
    }

    send_progress(tx, session, FINALIZE_FRACTION, Phase::Finalize, |_| {}).await?;
    let now = Instant::now();
    let complete = Frame::Complete(CompleteFrame {
        finished_at: session.unix_millis(now),
        elapsed_ms: millis(session.elapsed(now)),
    });
    send(tx, complete.encode()).await?;
    Ok(Outcome::Finalized)
}

/// Forwards upstream chunks verbatim until the body ends. Timers are local to
/// this function and stop when it returns. The first heartbeat goes out as
/// soon as relaying starts; soft progress waits one tick.
async fn relay(
    session: &mut StreamSession,
    timing: &StreamTiming,
    mut body: ByteStream,
    tx: &mpsc::Sender<Bytes>,
) -> Result<Option<StreamFault>, Disconnected> {
    let now = Instant::now();
    let mut heartbeat = interval_at(now, timing.heartbeat());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut soft = interval_at(now + timing.soft_tick(), timing.soft_tick());
    soft.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = tx.closed() => return Err(Disconnected),
            _ = heartbeat.tick() => {
                let frame = Frame::Heartbeat(HeartbeatFrame {
                    ts: session.unix_millis(Instant::now()),
                });
                send(tx, frame.encode()).await?;
            }
            _ = soft.tick() => {
                let now = Instant::now();
                if let Some(fraction) = session.soft_step(now) {
                    let mut frame = ProgressFrame::new(fraction, Phase::Generating);
                    frame.elapsed_ms = Some(millis(session.elapsed(now)));
                    send(tx, Frame::Progress(frame).encode()).await?;
                }
            }
            item = body.next() => match item {
                Some(Ok(chunk)) => {
                    if !chunk.is_empty() {
                        send(tx, chunk).await?;
                    }
                }
                Some(Err(fault)) => return Ok(Some(fault.into())),
                None => return Ok(None),
            },
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use visiongate_common::StreamTiming;

/// Per-response progress state. Lives exactly as long as one outbound stream.
#[derive(Debug, Clone)]
pub struct StreamSession {
    started_at: Instant,
    started_unix_ms: i64,
    emitted: f64,
    last_emit_at: Instant,
    estimated_total: Duration,
    tail_ceiling: f64,
    threshold: f64,
    min_interval: Duration,
}

impl StreamSession {
    pub fn new(timing: &StreamTiming, now: Instant) -> Self {
        let started_unix_ms =
            i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
                .unwrap_or(i64::MAX);
        Self {
            started_at: now,
            started_unix_ms,
            emitted: 0.0,
            last_emit_at: now,
            estimated_total: timing.estimated_total(),
            tail_ceiling: timing.tail_ceiling,
            threshold: timing.soft_threshold,
            min_interval: timing.soft_min_interval(),
        }
    }

    pub fn emitted(&self) -> f64 {
        self.emitted
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Wall-clock milliseconds at `now`, anchored once at session start and
    /// advanced by the session clock.
    pub fn unix_millis(&self, now: Instant) -> i64 {
        let elapsed = i64::try_from(self.elapsed(now).as_millis()).unwrap_or(i64::MAX);
        self.started_unix_ms.saturating_add(elapsed)
    }

    /// Records a fixed-fraction emission. The tracked fraction only moves
    /// upwards, so a floor below the current value is a no-op on the value
    /// but still counts as an emission for rate limiting.
    pub fn advance_to(&mut self, fraction: f64, now: Instant) -> f64 {
        if fraction > self.emitted {
            self.emitted = fraction;
        }
        self.last_emit_at = now;
        self.emitted
    }

    /// `min(tail_ceiling, elapsed / estimated_total)`.
    pub fn estimate(&self, now: Instant) -> f64 {
        let ratio = self.elapsed(now).as_secs_f64() / self.estimated_total.as_secs_f64();
        ratio.min(self.tail_ceiling)
    }

    /// Returns the next soft-progress fraction to emit, if any.
    pub fn soft_step(&mut self, now: Instant) -> Option<f64> {
        let estimate = self.estimate(now);
        if estimate - self.emitted <= self.threshold {
            return None;
        }
        if now.saturating_duration_since(self.last_emit_at) < self.min_interval {
            return None;
        }
        self.emitted = estimate;
        self.last_emit_at = now;
        Some(estimate)
    }
}

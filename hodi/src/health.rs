use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::warn;

const MIN_DEADLINE: std::time::Duration = std::time::Duration::from_secs(30);
const MISSED_TICKS: u32 = 10;
const NEVER: i64 = i64::MIN;

#[derive(Debug)]
pub struct LivenessStatus {
    pub healthy: bool,
    pub last_tick: Option<OffsetDateTime>,
    pub deadline: Duration,
}

impl IntoResponse for LivenessStatus {
    /// 200 while the flush timer is ticking, 500 once it stalls. The body
    /// carries the status for debugging.
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

/// Heartbeat of the flush timer. The timer loop is the only long-running part
/// of the engine, so the process is live as long as it keeps ticking.
#[derive(Clone, Debug)]
pub struct FlushLiveness {
    last_tick_ms: Arc<AtomicI64>,
    deadline: Duration,
}

impl FlushLiveness {
    /// The deadline is ten flush intervals, and never less than thirty seconds.
    pub fn new(flush_interval: std::time::Duration) -> Self {
        let deadline = flush_interval
            .saturating_mul(MISSED_TICKS)
            .max(MIN_DEADLINE);
        Self {
            last_tick_ms: Arc::new(AtomicI64::new(NEVER)),
            deadline: Duration::try_from(deadline).unwrap_or(Duration::MAX),
        }
    }

    pub fn report_healthy(&self) {
        self.last_tick_ms
            .store(unix_millis(OffsetDateTime::now_utc()), Ordering::Relaxed);
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn get_status(&self) -> LivenessStatus {
        let last_tick = match self.last_tick_ms.load(Ordering::Relaxed) {
            NEVER => None,
            ms => OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok(),
        };
        let healthy = last_tick
            .map(|tick| OffsetDateTime::now_utc() - tick <= self.deadline)
            .unwrap_or(false);

        if !healthy {
            warn!("flush timer liveness check failed, last tick: {:?}", last_tick);
        }

        LivenessStatus {
            healthy,
            last_tick,
            deadline: self.deadline,
        }
    }
}

fn unix_millis(ts: OffsetDateTime) -> i64 {
    i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

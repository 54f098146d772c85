use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accumulator::BatchAccumulator;
use crate::errors::SinkError;
use crate::health::FlushLiveness;
use crate::metrics_consts::{
    FLUSHES, FLUSH_BATCH_SIZE, PENDING_UPDATES, SINK_WRITES, SINK_WRITE_TIME, UPDATES_DROPPED,
};
use crate::sinks::HistorySink;
use crate::types::{Batch, PendingUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    Threshold,
    Manual,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Timer => "timer",
            FlushTrigger::Threshold => "threshold",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// Owns the pending batch and hands it to the sink, either when the timer
/// fires or when enough updates pile up.
///
/// Writes are detached: `flush` drains, spawns the write on the captured
/// runtime and returns immediately. Nothing waits for the outcome, a failed
/// write is logged and its updates are gone (at-most-once, lossy under sink
/// failure).
pub struct Flusher {
    accumulator: BatchAccumulator,
    sink: Arc<dyn HistorySink + Send + Sync>,
    runtime: Handle,
    threshold: usize,
    debug: bool,
}

impl Flusher {
    pub fn new(
        sink: Arc<dyn HistorySink + Send + Sync>,
        runtime: Handle,
        threshold: usize,
        debug: bool,
    ) -> Self {
        Self {
            accumulator: BatchAccumulator::new(),
            sink,
            runtime,
            threshold,
            debug,
        }
    }

    /// Queues an update, flushing right away if that fills the batch.
    pub fn append(&self, update: PendingUpdate) -> Option<JoinHandle<()>> {
        let size = self.accumulator.append(update);
        gauge!(PENDING_UPDATES).set(size as f64);

        if size >= self.threshold {
            return self.flush(FlushTrigger::Threshold);
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.accumulator.size()
    }

    /// Drains the batch and spawns its write. Returns `None` without touching
    /// the sink when there was nothing to write.
    pub fn flush(&self, trigger: FlushTrigger) -> Option<JoinHandle<()>> {
        let batch = self.accumulator.drain();
        gauge!(PENDING_UPDATES).set(0.0);
        if batch.is_empty() {
            return None;
        }

        let size = batch.len();
        if self.debug {
            info!(trigger = trigger.as_str(), size, "flushing batch");
        } else {
            debug!(trigger = trigger.as_str(), size, "flushing batch");
        }
        counter!(FLUSHES, &[("trigger", trigger.as_str())]).increment(1);
        histogram!(FLUSH_BATCH_SIZE).record(size as f64);

        let sink = self.sink.clone();
        Some(self.runtime.spawn(write(sink, batch)))
    }

    /// Starts the recurring flush. The first tick fires one period from now.
    pub fn spawn_timer(
        self: &Arc<Self>,
        period: Duration,
        liveness: FlushLiveness,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let _runtime = self.runtime.enter();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        liveness.report_healthy();

        let flusher = self.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        liveness.report_healthy();
                        drop(flusher.flush(FlushTrigger::Timer));
                    }
                }
            }
            debug!("flush timer stopped");
        })
    }
}

async fn write(sink: Arc<dyn HistorySink + Send + Sync>, batch: Batch) {
    let size = batch.len();
    let start = Instant::now();

    match sink.write_batch(batch).await {
        Ok(()) => {
            counter!(SINK_WRITES, &[("result", "ok")]).increment(1);
        }
        Err(SinkError::PartialFailure {
            failed,
            total,
            reason,
        }) => {
            counter!(SINK_WRITES, &[("result", "partial")]).increment(1);
            counter!(UPDATES_DROPPED).increment(failed as u64);
            warn!(
                "{} of {} updates rejected by the store, dropping them: {}",
                failed, total, reason
            );
        }
        Err(e) => {
            counter!(SINK_WRITES, &[("result", "error")]).increment(1);
            counter!(UPDATES_DROPPED).increment(size as u64);
            error!("failed to write batch of {} updates, dropping it: {}", size, e);
        }
    }

    histogram!(SINK_WRITE_TIME).record(start.elapsed().as_millis() as f64);
}

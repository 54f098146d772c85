use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::StartupError;
use crate::flusher::{FlushTrigger, Flusher};
use crate::health::FlushLiveness;
use crate::metrics_consts::{
    EMPTY_KEYS, OBSERVATIONS_RECEIVED, OBSERVATIONS_SUPPRESSED, UPDATES_ENQUEUED,
};
use crate::seen_cache::ClassCaches;
use crate::sinks::HistorySink;
use crate::time::TimeSource;
use crate::types::{IdentifierClass, PendingUpdate};

/// Knobs shared by the four class caches and the flusher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Entries kept per class before the least recently used one is evicted.
    pub cache_capacity: usize,
    /// Dedup window: a key observed again within it produces no update.
    pub cache_ttl: Duration,
    pub flush_interval: Duration,
    /// Pending updates that force a flush before the next tick.
    pub flush_threshold: usize,
    /// Log every flush at info level.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100_000,
            cache_ttl: Duration::from_secs(5 * 60),
            flush_interval: Duration::from_secs(1),
            flush_threshold: 1000,
            debug: false,
        }
    }
}

/// Records first seen, last seen and count for every observed identifier.
///
/// Observations go through a per-class dedup cache; only misses become
/// pending updates, which are flushed to the sink in bulk by a timer or once
/// the batch is full. `observe` never waits on the sink.
pub struct HistoryEngine {
    caches: ClassCaches,
    flusher: Arc<Flusher>,
    time: Arc<dyn TimeSource + Send + Sync>,
    liveness: FlushLiveness,
    cancel: CancellationToken,
}

impl HistoryEngine {
    /// Builds the caches and starts the flush timer on the current tokio
    /// runtime, which also runs every sink write.
    pub fn start(
        config: EngineConfig,
        sink: Arc<dyn HistorySink + Send + Sync>,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Result<HistoryEngine, StartupError> {
        let runtime = Handle::try_current().map_err(|_| StartupError::NoRuntime)?;
        let capacity =
            NonZeroUsize::new(config.cache_capacity).ok_or(StartupError::ZeroCapacity)?;
        if config.flush_threshold == 0 {
            return Err(StartupError::ZeroThreshold);
        }
        if config.flush_interval.is_zero() {
            return Err(StartupError::ZeroInterval);
        }

        let caches = ClassCaches::new(capacity, config.cache_ttl, time.clone());
        let flusher = Arc::new(Flusher::new(
            sink,
            runtime,
            config.flush_threshold,
            config.debug,
        ));
        let liveness = FlushLiveness::new(config.flush_interval);
        let cancel = CancellationToken::new();
        drop(flusher.spawn_timer(config.flush_interval, liveness.clone(), cancel.clone()));

        info!(
            cache_capacity = config.cache_capacity,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            flush_threshold = config.flush_threshold,
            "history engine started"
        );

        Ok(HistoryEngine {
            caches,
            flusher,
            time,
            liveness,
            cancel,
        })
    }

    /// Records one observation and returns whether it was a duplicate within
    /// the dedup window. Never blocks on the sink and never fails; empty keys
    /// are counted and otherwise ignored.
    pub fn observe(&self, class: IdentifierClass, key: &str) -> bool {
        counter!(OBSERVATIONS_RECEIVED, &[("class", class.as_str())]).increment(1);
        if key.is_empty() {
            counter!(EMPTY_KEYS, &[("class", class.as_str())]).increment(1);
            return false;
        }

        if !self.caches.for_class(class).check_and_insert(key) {
            counter!(OBSERVATIONS_SUPPRESSED, &[("class", class.as_str())]).increment(1);
            return true;
        }

        counter!(UPDATES_ENQUEUED, &[("class", class.as_str())]).increment(1);
        drop(
            self.flusher
                .append(PendingUpdate::new(class, key, self.time.now())),
        );
        false
    }

    /// Whether `key` is currently inside its dedup window.
    pub fn contains(&self, class: IdentifierClass, key: &str) -> bool {
        self.caches.for_class(class).contains(key)
    }

    pub fn cached(&self) -> usize {
        self.caches.len()
    }

    pub fn pending(&self) -> usize {
        self.flusher.pending()
    }

    /// Flushes now rather than on the next tick.
    pub fn flush(&self) -> Option<JoinHandle<()>> {
        self.flusher.flush(FlushTrigger::Manual)
    }

    pub fn liveness(&self) -> FlushLiveness {
        self.liveness.clone()
    }

    /// Stops the timer and flushes whatever is pending. The returned handle
    /// completes once that final write is done; observations made after this
    /// stay pending until another explicit flush.
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        info!("history engine shutting down");
        self.flusher.flush(FlushTrigger::Shutdown)
    }
}

impl Drop for HistoryEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

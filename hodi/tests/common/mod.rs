#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hodi::config::{Config, EsConfig};
use hodi::errors::SinkError;
use hodi::sinks::HistorySink;
use hodi::types::Batch;

pub fn default_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        print_sink: false,
        cache_size: 100_000,
        cache_age_min: 5,
        flush_interval_ms: 1000,
        flush_threshold: 1000,
        debug: true,
        elasticsearch: EsConfig {
            es_host: None,
            index_prefix: "hodi".to_string(),
            es_script_id: None,
            es_refresh_interval: "60s".to_string(),
            es_timeout_ms: 1000,
            es_max_idle_connections: 1,
        },
        export_prometheus: false,
    }
}

/// Hands every batch it receives to the test.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Batch>,
    calls: AtomicUsize,
}

impl ChannelSink {
    pub fn new() -> (Arc<ChannelSink>, mpsc::UnboundedReceiver<Batch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink {
            tx,
            calls: AtomicUsize::new(0),
        };
        (Arc::new(sink), rx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySink for ChannelSink {
    async fn write_batch(&self, batch: Batch) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        drop(self.tx.send(batch));
        Ok(())
    }
}

/// Takes `delay` to acknowledge each batch.
pub struct SlowSink {
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Arc<SlowSink> {
        Arc::new(SlowSink {
            delay,
            completed: AtomicUsize::new(0),
        })
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySink for SlowSink {
    async fn write_batch(&self, _batch: Batch) -> Result<(), SinkError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Rejects every batch, like an unreachable store would.
#[derive(Default)]
pub struct FailingSink {
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySink for FailingSink {
    async fn write_batch(&self, _batch: Batch) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

/// Lets spawned writes run to completion on a current-thread runtime.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

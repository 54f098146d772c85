use async_trait::async_trait;
use tracing::info;

use crate::errors::SinkError;
use crate::types::Batch;

pub mod elasticsearch;
pub mod memory;

/// Where flushed batches go. Each call is one bulk request; the flusher
/// spawns it and never looks at the outcome beyond logging it.
#[async_trait]
pub trait HistorySink {
    async fn write_batch(&self, batch: Batch) -> Result<(), SinkError>;
}

pub struct PrintSink {}

#[async_trait]
impl HistorySink for PrintSink {
    async fn write_batch(&self, batch: Batch) -> Result<(), SinkError> {
        let span = tracing::span!(tracing::Level::INFO, "batch of observations");
        let _enter = span.enter();

        for update in batch {
            info!(
                class = %update.class,
                key = %update.key,
                observed_at = %update.observed_at,
                "upsert"
            );
        }

        Ok(())
    }
}

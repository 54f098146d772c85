use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::SinkError;
use crate::sinks::HistorySink;
use crate::types::{Batch, HistoryRecord, IdentifierClass};

/// In-process store applying the same create-or-increment semantics the
/// Elasticsearch script does.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<HashMap<(IdentifierClass, String), HistoryRecord>>,
    writes: Mutex<Vec<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, class: IdentifierClass, key: &str) -> Option<HistoryRecord> {
        self.records.lock().get(&(class, key.to_string())).copied()
    }

    /// Sizes of the batches received so far, in arrival order.
    pub fn writes(&self) -> Vec<usize> {
        self.writes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl HistorySink for MemorySink {
    async fn write_batch(&self, batch: Batch) -> Result<(), SinkError> {
        self.writes.lock().push(batch.len());

        let mut records = self.records.lock();
        for update in batch {
            let id = (update.class, update.key);
            let existing = records.get(&id).copied();
            records.insert(id, HistoryRecord::apply(existing, update.observed_at));
        }

        Ok(())
    }
}

use parking_lot::Mutex;

use crate::types::{Batch, PendingUpdate};

/// Ordered buffer of updates waiting for the next flush. It does no
/// deduplication of its own: the seen caches already guarantee at most one
/// update per key per dedup window.
#[derive(Default)]
pub struct BatchAccumulator {
    pending: Mutex<Vec<PendingUpdate>>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the current batch and returns its new size.
    pub fn append(&self, update: PendingUpdate) -> usize {
        let mut pending = self.pending.lock();
        pending.push(update);
        pending.len()
    }

    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Takes everything accumulated so far and leaves an empty batch behind.
    pub fn drain(&self) -> Batch {
        std::mem::take(&mut *self.pending.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentifierClass;
    use time::macros::datetime;

    fn update(key: &str) -> PendingUpdate {
        PendingUpdate::new(IdentifierClass::Email, key, datetime!(2024-03-01 10:00 UTC))
    }

    #[test]
    fn append_reports_size_and_drain_resets() {
        let acc = BatchAccumulator::new();
        assert_eq!(acc.append(update("a@example.com")), 1);
        assert_eq!(acc.append(update("b@example.com")), 2);
        assert_eq!(acc.size(), 2);

        let batch = acc.drain();
        assert_eq!(
            batch.iter().map(|u| u.key.as_str()).collect::<Vec<_>>(),
            vec!["a@example.com", "b@example.com"]
        );
        assert!(acc.is_empty());
        assert!(acc.drain().is_empty());
    }

    #[test]
    fn keeps_repeated_keys() {
        let acc = BatchAccumulator::new();
        acc.append(update("a@example.com"));
        acc.append(update("a@example.com"));
        assert_eq!(acc.drain().len(), 2);
    }
}

pub const OBSERVATIONS_RECEIVED: &str = "hodi_observations_received";
pub const OBSERVATIONS_SUPPRESSED: &str = "hodi_observations_suppressed";
pub const EMPTY_KEYS: &str = "hodi_empty_keys";
pub const UPDATES_ENQUEUED: &str = "hodi_updates_enqueued";
pub const CACHE_EVICTIONS: &str = "hodi_cache_evictions";
pub const CACHE_EXPIRED: &str = "hodi_cache_expired";
pub const PENDING_UPDATES: &str = "hodi_pending_updates";
pub const FLUSHES: &str = "hodi_flushes";
pub const FLUSH_BATCH_SIZE: &str = "hodi_flush_batch_size";
pub const SINK_WRITES: &str = "hodi_sink_writes";
pub const SINK_WRITE_TIME: &str = "hodi_sink_write_time_ms";
pub const UPDATES_DROPPED: &str = "hodi_dropped_updates";
pub const PROVISION_FAILED: &str = "hodi_provision_failed";

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request to elasticsearch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("elasticsearch responded with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("{failed} of {total} upserts were rejected, first error: {reason}")]
    PartialFailure {
        failed: usize,
        total: usize,
        reason: String,
    },
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("failed to encode bulk request: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no tokio runtime available to run the flush timer")]
    NoRuntime,
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,
    #[error("flush threshold must be greater than zero")]
    ZeroThreshold,
    #[error("flush interval must be greater than zero")]
    ZeroInterval,
    #[error("failed to set up sink: {0}")]
    Sink(#[from] SinkError),
}

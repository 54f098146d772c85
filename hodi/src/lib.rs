pub mod accumulator;
pub mod config;
pub mod engine;
pub mod errors;
pub mod flusher;
pub mod health;
pub mod metrics_consts;
pub mod router;
pub mod seen_cache;
pub mod server;
pub mod sinks;
pub mod source;
pub mod time;
pub mod types;

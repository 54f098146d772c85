use std::time::Duration;

use envconfig::Envconfig;

use crate::engine::EngineConfig;
use crate::sinks::elasticsearch::ElasticsearchConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8081")]
    pub port: u16,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "100000")]
    pub cache_size: usize,

    #[envconfig(default = "5")]
    pub cache_age_min: u64,

    #[envconfig(default = "1000")]
    pub flush_interval_ms: u64,

    #[envconfig(default = "1000")]
    pub flush_threshold: usize,

    #[envconfig(default = "false")]
    pub debug: bool,

    #[envconfig(nested = true)]
    pub elasticsearch: EsConfig,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

#[derive(Envconfig, Clone, Debug)]
pub struct EsConfig {
    /// Unset leaves the source disabled unless the print sink is on.
    pub es_host: Option<String>,

    #[envconfig(default = "hodi")]
    pub index_prefix: String,

    pub es_script_id: Option<String>,

    #[envconfig(default = "60s")]
    pub es_refresh_interval: String,

    #[envconfig(default = "10000")]
    pub es_timeout_ms: u64,

    #[envconfig(default = "51")]
    pub es_max_idle_connections: usize,
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_capacity: self.cache_size,
            cache_ttl: Duration::from_secs(self.cache_age_min * 60),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            flush_threshold: self.flush_threshold,
            debug: self.debug,
        }
    }

    /// Sink settings, or `None` when no endpoint is configured.
    pub fn elasticsearch(&self) -> Option<ElasticsearchConfig> {
        let es = &self.elasticsearch;
        let host = es.es_host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        Some(ElasticsearchConfig {
            host: host.to_string(),
            index_prefix: es.index_prefix.clone(),
            script_id: es.es_script_id.clone().filter(|id| !id.is_empty()),
            refresh_interval: es.es_refresh_interval.clone(),
            timeout: Duration::from_millis(es.es_timeout_ms),
            max_idle_connections: es.es_max_idle_connections,
        })
    }
}

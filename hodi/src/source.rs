use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::HistoryEngine;
use crate::errors::StartupError;
use crate::sinks::elasticsearch::ElasticsearchSink;
use crate::sinks::{HistorySink, PrintSink};
use crate::time::SystemTime;
use crate::types::IdentifierClass;

pub const SOURCE_NAME: &str = "hodi";

/// What a source may attach to a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    pub source: String,
    pub data: serde_json::Value,
}

/// Called exactly once per query with the source's contribution, if any.
pub type Completion = Box<dyn FnOnce(Option<Enrichment>) + Send>;

/// A pluggable data source the host fans each query out to.
pub trait ObservationSource: Send + Sync {
    fn get_domain(&self, key: &str, done: Completion);
    fn get_ip(&self, key: &str, done: Completion);
    fn get_md5(&self, key: &str, done: Completion);
    fn get_email(&self, key: &str, done: Completion);

    fn query(&self, class: IdentifierClass, key: &str, done: Completion) {
        match class {
            IdentifierClass::Domain => self.get_domain(key, done),
            IdentifierClass::Ip => self.get_ip(key, done),
            IdentifierClass::Md5 => self.get_md5(key, done),
            IdentifierClass::Email => self.get_email(key, done),
        }
    }
}

pub trait SourceRegistry {
    fn add_source(&mut self, name: &str, source: Arc<dyn ObservationSource>);
}

/// Exposes the history engine to the host. It never enriches anything: every
/// query is answered with `None` straight away and then recorded.
pub struct HodiSource {
    engine: HistoryEngine,
}

impl HodiSource {
    pub fn new(engine: HistoryEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &HistoryEngine {
        &self.engine
    }

    fn process(&self, class: IdentifierClass, key: &str, done: Completion) {
        done(None);
        _ = self.engine.observe(class, key);
    }
}

impl ObservationSource for HodiSource {
    fn get_domain(&self, key: &str, done: Completion) {
        self.process(IdentifierClass::Domain, key, done)
    }

    fn get_ip(&self, key: &str, done: Completion) {
        self.process(IdentifierClass::Ip, key, done)
    }

    fn get_md5(&self, key: &str, done: Completion) {
        self.process(IdentifierClass::Md5, key, done)
    }

    fn get_email(&self, key: &str, done: Completion) {
        self.process(IdentifierClass::Email, key, done)
    }
}

/// Picks a sink from the configuration, provisions it, starts the engine and
/// registers it. Without a sink the source stays disabled and nothing is
/// registered.
pub async fn init_source<R: SourceRegistry + ?Sized>(
    config: &Config,
    registry: &mut R,
) -> Result<Option<Arc<HodiSource>>, StartupError> {
    let sink: Arc<dyn HistorySink + Send + Sync> = if config.print_sink {
        info!("using print sink, history will not be persisted");
        Arc::new(PrintSink {})
    } else if let Some(es) = config.elasticsearch() {
        let sink = ElasticsearchSink::new(es)?;
        let failed = sink.provision().await;
        if failed > 0 {
            warn!(
                "{} of {} indexes could not be provisioned, continuing",
                failed,
                IdentifierClass::ALL.len()
            );
        }
        Arc::new(sink)
    } else {
        warn!("no ES_HOST configured, {} source disabled", SOURCE_NAME);
        return Ok(None);
    };

    let engine = HistoryEngine::start(config.engine_config(), sink, Arc::new(SystemTime {}))?;
    let source = Arc::new(HodiSource::new(engine));
    registry.add_source(SOURCE_NAME, source.clone());
    info!("registered {} source", SOURCE_NAME);

    Ok(Some(source))
}

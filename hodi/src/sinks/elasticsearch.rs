use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::errors::SinkError;
use crate::metrics_consts::PROVISION_FAILED;
use crate::sinks::HistorySink;
use crate::time::iso8601_millis;
use crate::types::{Batch, IdentifierClass, PendingUpdate};

/// Create-or-increment, parameterized only by the observation time. The
/// `upsert` document sent alongside covers the create half.
pub const INLINE_SCRIPT: &str = "ctx._source.count += 1; ctx._source.lastSeen = params.lastSeen";

// Concurrent flushes from other instances can race on the same document
const RETRY_ON_CONFLICT: u32 = 3;

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub host: String,
    pub index_prefix: String,
    /// Reference a stored script by id instead of sending the inline one.
    pub script_id: Option<String>,
    pub refresh_interval: String,
    pub timeout: Duration,
    pub max_idle_connections: usize,
}

#[derive(Serialize)]
struct BulkAction<'a> {
    update: UpdateTarget<'a>,
}

#[derive(Serialize)]
struct UpdateTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    retry_on_conflict: u32,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    script: Script<'a>,
    upsert: UpsertDocument<'a>,
}

#[derive(Serialize)]
struct Script<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'a str>,
    params: ScriptParams<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScriptParams<'a> {
    last_seen: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertDocument<'a> {
    count: u64,
    first_seen: &'a str,
    last_seen: &'a str,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    base_url: String,
    index_prefix: String,
    script_id: Option<String>,
    refresh_interval: String,
}

impl ElasticsearchSink {
    pub fn new(config: ElasticsearchConfig) -> Result<ElasticsearchSink, SinkError> {
        let base_url = normalize_host(&config.host);
        info!("using elasticsearch at {}", base_url);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(ElasticsearchSink {
            client,
            base_url,
            index_prefix: config.index_prefix,
            script_id: config.script_id,
            refresh_interval: config.refresh_interval,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Renders a batch as `_bulk` NDJSON: an `update` action line followed by
    /// its script/upsert line, for every update, newline terminated.
    pub fn bulk_body(&self, batch: &[PendingUpdate]) -> Result<String, SinkError> {
        let mut body = String::with_capacity(batch.len() * 256);

        for update in batch {
            let index = update.class.index_name(&self.index_prefix);
            let observed_at = iso8601_millis(update.observed_at)?;

            let action = BulkAction {
                update: UpdateTarget {
                    index: &index,
                    id: &update.key,
                    retry_on_conflict: RETRY_ON_CONFLICT,
                },
            };
            let script = match &self.script_id {
                Some(id) => Script {
                    id: Some(id.as_str()),
                    source: None,
                    lang: None,
                    params: ScriptParams {
                        last_seen: &observed_at,
                    },
                },
                None => Script {
                    id: None,
                    source: Some(INLINE_SCRIPT),
                    lang: Some("painless"),
                    params: ScriptParams {
                        last_seen: &observed_at,
                    },
                },
            };
            let request = UpsertRequest {
                script,
                upsert: UpsertDocument {
                    count: 1,
                    first_seen: &observed_at,
                    last_seen: &observed_at,
                },
            };

            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&request)?);
            body.push('\n');
        }

        Ok(body)
    }

    /// Makes sure every class index exists with our refresh interval and
    /// mapping. Failures are logged per index and counted in the return value,
    /// they never stop startup.
    pub async fn provision(&self) -> usize {
        let mut failed = 0;
        for class in IdentifierClass::ALL {
            let index = class.index_name(&self.index_prefix);
            if let Err(e) = self.provision_index(&index).await {
                metrics::counter!(PROVISION_FAILED).increment(1);
                warn!("failed to provision index {}: {}", index, e);
                failed += 1;
            }
        }
        failed
    }

    pub async fn provision_index(&self, index: &str) -> Result<(), SinkError> {
        let url = format!("{}/{}", self.base_url, index);
        let exists = self.client.head(&url).send().await?;

        match exists.status() {
            StatusCode::OK => {
                debug!("index {} exists, updating settings", index);
                let response = self
                    .client
                    .put(format!("{url}/_settings"))
                    .json(&json!({
                        "index": { "refresh_interval": self.refresh_interval }
                    }))
                    .send()
                    .await?;
                ensure_success(response).await?;
            }
            StatusCode::NOT_FOUND => {
                info!("creating index {}", index);
                let response = self
                    .client
                    .put(&url)
                    .json(&json!({
                        "settings": {
                            "index": { "refresh_interval": self.refresh_interval }
                        },
                        "mappings": {
                            "properties": {
                                "firstSeen": { "type": "date" },
                                "lastSeen": { "type": "date" },
                                "count": { "type": "long" }
                            }
                        }
                    }))
                    .send()
                    .await?;
                ensure_success(response).await?;
            }
            status => {
                return Err(SinkError::Rejected {
                    status: status.as_u16(),
                    body: String::new(),
                })
            }
        }

        Ok(())
    }
}

#[async_trait]
impl HistorySink for ElasticsearchSink {
    async fn write_batch(&self, batch: Batch) -> Result<(), SinkError> {
        let total = batch.len();
        let body = self.bulk_body(&batch)?;

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let parsed: BulkResponse = response.json().await?;
        debug!(
            "bulk request of {} upserts took {}ms",
            total,
            start.elapsed().as_millis()
        );

        if parsed.errors {
            let rejected: Vec<&BulkItem> = parsed
                .items
                .iter()
                .flat_map(|item| item.values())
                .filter(|item| item.error.is_some() || item.status >= 300)
                .collect();
            let reason = rejected
                .iter()
                .find_map(|item| item.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            return Err(SinkError::PartialFailure {
                failed: rejected.len(),
                total,
                reason,
            });
        }

        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

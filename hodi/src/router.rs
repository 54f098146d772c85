use std::future::ready;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::health::FlushLiveness;
use crate::source::{Enrichment, ObservationSource, SourceRegistry};
use crate::types::IdentifierClass;

/// The host side of source registration: every query is fanned out to all
/// registered sources.
#[derive(Default, Clone)]
pub struct SourceRouter {
    sources: Vec<(String, Arc<dyn ObservationSource>)>,
}

impl SourceRouter {
    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceRegistry for SourceRouter {
    fn add_source(&mut self, name: &str, source: Arc<dyn ObservationSource>) {
        self.sources.push((name.to_string(), source));
    }
}

#[derive(Clone)]
struct AppState {
    sources: Arc<SourceRouter>,
    liveness: Option<FlushLiveness>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    class: IdentifierClass,
    key: String,
    results: Vec<Enrichment>,
}

async fn index() -> &'static str {
    "hodi"
}

async fn readiness() -> &'static str {
    "ok"
}

async fn liveness(State(state): State<AppState>) -> Response {
    match &state.liveness {
        Some(liveness) => liveness.get_status().into_response(),
        None => (StatusCode::OK, "no flush timer running").into_response(),
    }
}

async fn query(
    State(state): State<AppState>,
    Path((class, key)): Path<(String, String)>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let class: IdentifierClass = class
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;

    let mut pending = Vec::with_capacity(state.sources.sources.len());
    for (name, source) in &state.sources.sources {
        let (tx, rx) = oneshot::channel();
        source.query(
            class,
            &key,
            Box::new(move |result| {
                drop(tx.send(result));
            }),
        );
        pending.push((name, rx));
    }

    let mut results = Vec::new();
    for (name, rx) in pending {
        match rx.await {
            Ok(Some(enrichment)) => results.push(enrichment),
            Ok(None) => {}
            Err(_) => warn!("source {} dropped its completion", name),
        }
    }

    Ok(Json(QueryResponse {
        class,
        key,
        results,
    }))
}

pub fn router(
    sources: SourceRouter,
    flush_liveness: Option<FlushLiveness>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = AppState {
        sources: Arc::new(sources),
        liveness: flush_liveness,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(liveness))
        .route("/:class/:key", get(query))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Installing a global recorder when used as a library (during tests etc)
    // does not work well, so the caller decides.
    match metrics {
        Some(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        None => router,
    }
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];
    const BATCH_SIZES: &[f64] = &[
        1.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 750.0, 1000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_batch_size".to_string()),
            BATCH_SIZES,
        )?
        .install_recorder()
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

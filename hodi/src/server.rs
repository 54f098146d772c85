use std::future::Future;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::router::{self, SourceRouter};
use crate::source::init_source;

/// Serves the host router until `shutdown` resolves, then stops the engine
/// and waits for its last write.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut sources = SourceRouter::default();
    let hodi = init_source(&config, &mut sources).await?;

    let metrics = if config.export_prometheus {
        Some(router::setup_metrics_recorder()?)
    } else {
        None
    };
    let liveness = hodi.as_ref().map(|source| source.engine().liveness());
    let app = router::router(sources, liveness, metrics);

    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Some(write) = hodi.and_then(|source| source.engine().shutdown()) {
        if let Err(e) = write.await {
            error!("final flush did not complete: {}", e);
        }
    }
    info!("shutdown complete");

    Ok(())
}

use std::future::Future;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::prometheus::setup_metrics_recorder;
use crate::router;
use crate::stores::memory::MemoryStore;
use crate::stores::postgres::PgStore;
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder()?)
    } else {
        None
    };

    let app = if config.memory_store {
        // Memory store is only used for local debug, nothing survives a restart
        tracing::warn!("using the in-memory store, notices will not be persisted");
        let store = MemoryStore::from_seed(config.memory_store_apps.as_deref().unwrap_or_default());
        router::router(
            SystemTime {},
            store.clone(),
            store,
            config.max_body_size,
            metrics,
        )
    } else {
        let store = PgStore::new(&config.database_url, config.max_pg_connections)?;
        if config.run_migrations {
            store.migrate().await?;
            tracing::info!("database migrations applied");
        }
        router::router(
            SystemTime {},
            store.clone(),
            store,
            config.max_body_size,
            metrics,
        )
    };

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plombier::config::AppConfig;
use plombier::infra::db::Db;
use plombier::infra::realtime::{spawn_pg_listener, RealtimeHub};
use plombier::infra::storage::ObjectStorage;
use plombier::infra::store::{DirectoryStore, PgStore};
use plombier::{http, AppState, Settings};

const REALTIME_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let storage = ObjectStorage::new(&config).await?;
    let store: Arc<dyn DirectoryStore> = Arc::new(PgStore::new(db.clone()));
    let hub = RealtimeHub::new(REALTIME_CAPACITY);
    let listener_task = spawn_pg_listener(
        db,
        config.realtime_channel.clone(),
        hub.clone(),
        store.clone(),
    );

    let state = AppState::new(
        store,
        Arc::new(storage),
        hub.clone(),
        Settings::from(&config),
    )?;

    // A failed first load is served as a retryable error until /listings/reload succeeds.
    if let Err(err) = state.controller.reload().await {
        tracing::warn!(error = %err, "initial listing load failed");
    }
    let realtime_task = state.controller.clone().spawn_realtime(&hub);

    let app: Router = http::router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    let app = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    listener_task.abort();
    realtime_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

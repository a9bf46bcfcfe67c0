use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use jobcost_api::config::{init_tracing, load_settings};
use jobcost_api::directory::StaticCompanyDirectory;
use jobcost_api::events::{process_events, EventSender};
use jobcost_api::handlers::api_router;
use jobcost_api::services::AppServices;
use jobcost_api::store::memory::MemoryStore;
use jobcost_api::store::DocumentStore;
use jobcost_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings().context("failed to load settings")?;
    init_tracing(&settings.log_level, settings.log_json);
    info!(environment = %settings.environment, "starting jobcost-api");

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let directory = Arc::new(StaticCompanyDirectory::new(
        settings.company_prefixes.iter().cloned(),
    ));

    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(process_events(rx));
    let events = EventSender::new(tx);

    let services = AppServices::new(store.clone(), directory, events);
    let state = AppState {
        store,
        services,
        settings: settings.clone(),
    };

    let app = api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(
            settings.request_timeout_secs,
        )));

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install ctrl-c handler");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to install terminate handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

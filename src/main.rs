use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kgraph::api::state::AppState;
use kgraph::config::Settings;
use kgraph::create_router;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    info!(app_name = %settings.app_name, "Starting knowledge graph API");

    let state = match AppState::initialize(settings.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize services");
            std::process::exit(1);
        }
    };

    let router = create_router(state.clone());
    let addr = format!("{}:{}", settings.host, settings.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind server address");
            std::process::exit(1);
        }
    };
    info!(addr = %addr, "API server listening");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "API server error");
    }

    state.db.close().await;
    info!("Application shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

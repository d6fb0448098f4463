//! Price-caching micro-service — process entry point.

use price_cache_service::build_router;
use price_cache_service::config::Config;
use price_cache_service::scheduler::Scheduler;
use price_cache_service::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let cfg = Config::from_env();
    cfg.validate();

    let addr_str = format!("{}:{}", cfg.host, cfg.port);
    let addr: std::net::SocketAddr = addr_str.parse().unwrap_or_else(|_| {
        tracing::error!("invalid bind address '{}'", addr_str);
        std::process::exit(1);
    });

    if cfg.market_data_api_key.is_none() {
        tracing::warn!("MARKET_DATA_API_KEY is not set; market-data keys will fail with a configuration error");
    }

    let state = AppState::new(cfg);
    let mut scheduler = Scheduler::start(state.fetcher.clone(), state.scheduler_running.clone());

    let app = build_router(state);

    tracing::info!("listening on http://{addr}");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {err}");
        scheduler.stop().await;
        std::process::exit(1);
    }

    scheduler.stop().await;
    tracing::info!("shut down cleanly");
}

/// Awaits either Ctrl-C or SIGTERM, whichever comes first — a production
/// service under a container orchestrator is stopped with SIGTERM, not
/// Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

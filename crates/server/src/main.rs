// aletheia-server main.rs
// HTTP front for the Aletheia answer outbox

use aletheia_server::{feed_router, AppState, FeedConfig, ServerArgs, SharedState};
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aletheia_server=info,aletheia_core=info".into()),
        )
        .init();

    let args = ServerArgs::parse();
    let config = FeedConfig::from_args(&args);

    tracing::info!("📁 Outbox: {}", config.outbox.display());
    tracing::info!(
        "🔏 Allowed signers: {} (principal '{}')",
        config.allowed_signers.display(),
        config.signer_id
    );
    if !config.outbox.is_dir() {
        tracing::warn!("Outbox does not exist yet; the feed will be empty");
    }
    if !config.allowed_signers.is_file() {
        tracing::warn!("Trust store missing; every answer will show as unknown");
    }

    let state = Arc::new(AppState::new(config));
    tracing::info!(
        "📡 Change detection: {}",
        if state.is_watching() {
            "filesystem notifications + polling"
        } else {
            "polling"
        }
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = feed_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("🚀 Answer feed running at http://{}/ui/recent", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
    // Live event streams never finish on their own
    state.shutdown();
}

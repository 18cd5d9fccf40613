mod analysis;
mod backend;
mod config;
mod errors;
mod lifecycle;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend::http::HttpAnalysisBackend;
use crate::config::Config;
use crate::lifecycle::events::{TracingNavigator, TracingNotifier};
use crate::lifecycle::registry::LifecycleRegistry;
use crate::lifecycle::LifecycleContext;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SmartHire API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize analysis service client
    let backend = HttpAnalysisBackend::new(&config)?;
    info!("Analysis service client initialized ({})", config.analysis_service_url);

    let context = LifecycleContext {
        backend: Arc::new(backend),
        notifier: Arc::new(TracingNotifier),
        navigator: Arc::new(TracingNavigator),
        event_capacity: config.event_channel_capacity,
    };

    // Build app state
    let state = AppState {
        lifecycles: Arc::new(LifecycleRegistry::new(context)),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

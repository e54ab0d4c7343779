mod handlers;
mod state;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use memories_core::StoreConfig;
use std::env;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

/// Phone photos are routinely above axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/gallery", get(handlers::get_gallery))
        .route("/api/refresh", post(handlers::refresh_gallery))
        .route("/api/progress", get(handlers::get_progress))
        .route("/api/upload", post(handlers::upload))
        .route("/media/*key", get(handlers::get_media))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memories_web=info,memories_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get configuration from environment
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let state = match env::var("MEMORIES_STORE").as_deref() {
        Ok("memory") => {
            tracing::warn!("Using in-memory store, uploads are lost on restart");
            AppState::in_memory(&StoreConfig::new("memory"))
        }
        _ => AppState::new(&StoreConfig::from_env()?).await?,
    };

    let status = state.memories.mount().await;
    tracing::info!("Initial gallery load: {:?}", status);

    let app = router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Memories web server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

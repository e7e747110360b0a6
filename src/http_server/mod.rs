//! # HTTP Server
//!
//! Thin axum glue over the auth service: router, shared state, and the
//! serve loop. Handlers live in [`auth_routes`] and delegate 1:1 to
//! [`AuthService`]; no workflow logic lives at this layer.

pub mod auth_routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::service::AuthService;
use crate::auth::user::InMemoryUserStore;
use crate::config::Config;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService<InMemoryUserStore>>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    auth_routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(config: &Config, state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(state)).await
}

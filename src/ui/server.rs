//! Studio console HTTP server

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::audio::provider::MediaProvider;
use crate::config::StudioSettings;
use crate::studio::StudioHandle;
use crate::ui::handlers;

/// Shared application state
pub struct AppState {
    pub studio: StudioHandle,
    pub provider: Arc<dyn MediaProvider>,
}

/// Console API routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/mixer", get(handlers::get_mixer))
        .route("/api/sessions", get(handlers::get_sessions))
        .route("/api/sessions/:id", delete(handlers::close_session))
        .route("/api/requests", get(handlers::get_requests))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/sources/:id", delete(handlers::delete_source))
        .route("/api/sources/:id/gain", post(handlers::set_gain))
        .route("/api/sources/:id/mute", post(handlers::toggle_mute))
        .route("/api/sources/:id/pfl", post(handlers::toggle_pfl))
        .route("/api/sources/:id/sends/:bus", post(handlers::set_send))
        .route("/api/presenters/:id/on_air", post(handlers::set_on_air))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server for the studio console
pub struct WebServer {
    settings: StudioSettings,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(settings: StudioSettings, studio: StudioHandle, provider: Arc<dyn MediaProvider>) -> Self {
        Self {
            settings,
            state: Arc::new(AppState { studio, provider }),
        }
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.settings.bind_address, self.settings.http_port).parse()?;
        Ok(addr)
    }

    /// Serve until the listener fails
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr()?).await?;
        tracing::info!("Studio console at http://{}", listener.local_addr()?);
        axum::serve(listener, router(self.state)).await?;
        Ok(())
    }

    /// Run on the current runtime in the background
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Web server error: {}", e);
            }
        })
    }
}

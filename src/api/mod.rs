//! Read-only status surface
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Every check of the current generation with its last result
//! - `GET /status/{id}` - One check

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{CheckInfo, HealthResponse, StatusResponse};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:9731")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9731)),
            enable_cors: false,
        }
    }
}

/// Build the router for the status surface
#[cfg(feature = "api")]
pub fn router(state: ApiState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/status", get(routes::status::list_status))
        .route("/status/:id", get(routes::status::get_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};

    info!("starting status server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("status server up and running on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("status server error: {}", e);
        }
    });

    Ok(addr)
}

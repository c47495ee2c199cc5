//! Core library containing the storage gateway and route handlers for the transfer server.

pub mod config;
pub mod error;
pub mod files;
pub mod handlers;
pub mod middleware;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use files::{FileManager, FileManagerConfig, StorageStats, StoredFile};
pub use handlers::routes::create_routes;
pub use middleware::cors::cors_layer_from_config;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tower_http::{
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub file_manager: FileManager,
}

impl AppState {
    pub fn new(file_manager: FileManager) -> Self {
        Self {
            app_name: "Transfer Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            file_manager,
        }
    }
}

pub fn create_app_with_config(state: AppState, config: &AppConfig) -> Router {
    let index = config.frontend.static_dir.join(&config.frontend.index_file);
    let body_limit = config
        .storage
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let mut router = Router::new()
        .merge(create_routes())
        .route_service("/", ServeFile::new(index))
        .fallback_service(ServeDir::new(&config.frontend.static_dir))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ));

    if config.server.request_timeout_seconds > 0 {
        router = router.layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_seconds,
        )));
    }

    router = router.layer(middleware::cors::cors_layer_from_config(&config.cors));

    router = router.layer(axum_middleware::from_fn_with_state(
        config.logging.clone(),
        middleware::logging::request_logger,
    ));

    router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(middleware::logging::make_request_span)
            .on_failure(middleware::logging::log_failure),
    );

    router.with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<()> {
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let app = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

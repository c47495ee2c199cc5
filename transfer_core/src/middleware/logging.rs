//! Request logging middleware configuration

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::classify::ServerErrorsFailureClass;
use tracing::{info_span, Span};

use crate::config::LoggingConfig;

/// Span for `TraceLayer::make_span_with`.
pub fn make_request_span(request: &Request<Body>) -> Span {
    info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

/// Handler for `TraceLayer::on_failure`.
pub fn log_failure(error: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
    tracing::error!(
        latency_ms = latency.as_millis(),
        error = ?error,
        "request failed"
    );
}

/// One line per request with its status, plus latency when enabled.
pub async fn request_logger(
    State(config): State<LoggingConfig>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !config.log_requests {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status().as_u16();

    if config.log_latency {
        tracing::info!(
            method = %method,
            path = %path,
            status,
            latency_ms = start.elapsed().as_millis(),
            "request processed"
        );
    } else {
        tracing::info!(method = %method, path = %path, status, "request processed");
    }

    response
}

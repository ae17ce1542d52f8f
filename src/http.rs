//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::Collector;
use crate::exposition;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: Arc<Collector>,
    metrics_path: String,
}

/// Create the HTTP router.
fn create_router(collector: Arc<Collector>, metrics_path: &str) -> Router {
    let state = AppState {
        collector,
        metrics_path: metrics_path.to_string(),
    };

    Router::new()
        .route("/", get(index_handler))
        .route(metrics_path, get(metrics_handler))
        .route("/debug/dump", get(dump_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Landing page linking to the metrics endpoint.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\
         <head><title>OpenConfig Telemetry Exporter</title></head>\
         <body><h1>OpenConfig Telemetry Exporter</h1>\
         <p><a href=\"{path}\">Metrics</a></p>\
         </body></html>",
        path = state.metrics_path
    ))
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let records = state.collector.collect().await;
    let body = exposition::render(&records);

    (
        StatusCode::OK,
        [("content-type", exposition::CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// Plain-text dump of every device tree, for debugging.
async fn dump_handler(State(state): State<AppState>) -> Response {
    let mut body = state.collector.dump().join("\n");
    body.push('\n');

    (StatusCode::OK, body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: Arc<Collector>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(collector: Arc<Collector>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.collector, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

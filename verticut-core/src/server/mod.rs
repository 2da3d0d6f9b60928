//! Local HTTP server: media listing, descriptor submission and run control.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::ProcessRequest;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::library::INPUT_ROUTE;
use crate::pipeline::RunReport;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    busy: Arc<AtomicBool>,
    last_report: Arc<Mutex<Option<RunReport>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            busy: Arc::new(AtomicBool::new(false)),
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    fn set_report(&self, report: RunReport) {
        let mut guard = self.last_report.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(report);
    }

    fn report(&self) -> Option<RunReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn current_title(&self) -> String {
        self.report().map(|r| r.title).unwrap_or_default()
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        uri,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Build the router with permissive CORS for the local browser UI.
pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.input_folder);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/files", get(handlers::list_files))
        .route("/trim", post(handlers::submit_trims))
        .route("/process", post(handlers::start_processing))
        .route("/status", get(handlers::run_status))
        .nest_service(INPUT_ROUTE, static_files)
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(config: Config) -> Result<()> {
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    log::info!("Server running at: http://{}/files", address);
    log::info!("Input folder: {:?}", config.input_folder);
    log::info!("Output folder: {:?}", config.output_folder);

    axum::serve(listener, create_router(AppState::new(config)))
        .await
        .context("HTTP server failed")?;
    Ok(())
}

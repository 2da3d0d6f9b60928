use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::library::{MediaListing, list_media};
use crate::modes::Mode;
use crate::pipeline::{Pipeline, RunReport, RunState};
use crate::request::TrimRequest;
use crate::runner::FfmpegRunner;

/// Body of `POST /process`. Unset options keep the pipeline defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub mode: Mode,
    pub produce_vertical: Option<bool>,
    pub produce_screenshots: Option<bool>,
    pub remove_source_files: Option<bool>,
    pub hashtags: Option<String>,
}

impl ProcessRequest {
    fn into_pipeline(self, state: &AppState) -> Pipeline {
        let config = &state.config;
        let mut pipeline = Pipeline::new(self.mode, &config.input_folder, &config.output_folder);
        if let Some(enabled) = self.produce_vertical {
            pipeline = pipeline.produce_vertical(enabled);
        }
        if let Some(enabled) = self.produce_screenshots {
            pipeline = pipeline.produce_screenshots(enabled);
        }
        if let Some(enabled) = self.remove_source_files {
            pipeline = pipeline.remove_source_files(enabled);
        }
        if let Some(tags) = self.hashtags {
            pipeline = pipeline.hashtags(&tags);
        }
        pipeline
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<MediaListing>> {
    let folder = state.config.input_folder.clone();
    let listing = tokio::task::spawn_blocking(move || list_media(folder))
        .await
        .map_err(|e| ApiError::internal(format!("Listing task failed: {e}")))?
        .map_err(|e| {
            log::error!("Error reading folder or files: {:#}", e);
            ApiError::internal("Failed to read files from input folder")
        })?;
    Ok(Json(listing))
}

/// Store a new edit descriptor. Accepts the titled object or a bare array.
pub async fn submit_trims(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = TrimRequest::from_json(&body).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    request.validate()?;

    request
        .save(&state.config.trim_data_path)
        .map_err(|e| ApiError::internal(format!("{e:#}")))?;

    log::info!(
        "Saved {} trim records for \"{}\"",
        request.videos.len(),
        request.all_videos_title
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "saved": request.videos.len(),
            "title": request.all_videos_title,
        })),
    ))
}

/// Start one pipeline run over the stored descriptor in the background.
pub async fn start_processing(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let path = &state.config.trim_data_path;
    if !path.exists() {
        return Err(ApiError::NotFound(format!(
            "No trim descriptor at {}; submit one with POST /trim",
            path.display()
        )));
    }
    let request = TrimRequest::load(path).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;

    let mode = body.mode;
    let pipeline = body.into_pipeline(&state);
    pipeline.validate(&request)?;

    if state
        .busy
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(ApiError::Conflict(
            "A pipeline run is already in progress".to_string(),
        ));
    }

    state.set_report(RunReport::started(&request.all_videos_title, mode));
    let count = request.videos.len();

    let handle = tokio::task::spawn_blocking(move || {
        let runner = FfmpegRunner::new();
        pipeline.run(&request, &runner)
    });

    let background = state.clone();
    let title = state.current_title();
    tokio::spawn(async move {
        match handle.await {
            Ok(report) => background.set_report(report),
            Err(e) => {
                log::error!("Pipeline task panicked: {}", e);
                let mut report = RunReport::started(&title, mode);
                report.state = RunState::Failed;
                report.error = Some(e.to_string());
                background.set_report(report);
            }
        }
        background.busy.store(false, Ordering::SeqCst);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "mode": mode, "videos": count })),
    ))
}

pub async fn run_status(State(state): State<AppState>) -> Json<Value> {
    let busy = state.busy.load(Ordering::SeqCst);
    let report = state
        .report()
        .and_then(|r| serde_json::to_value(r).ok())
        .unwrap_or_else(|| json!({ "state": "idle" }));
    Json(json!({ "busy": busy, "report": report }))
}

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{analysis::image::decode_image, errors::ApiError, state::AppState};

const MISSING_INPUT: &str = "Missing script or image data";

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// Ticker symbol.
    pub script: Option<String>,
    /// Data URL or raw base64.
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
}

#[instrument(skip(state, payload))]
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "analyze body rejected");
        ApiError::validation(MISSING_INPUT)
    })?;

    let script = req.script.as_deref().map(str::trim).unwrap_or_default();
    let image = req.image.as_deref().unwrap_or_default();
    if script.is_empty() || image.trim().is_empty() {
        return Err(ApiError::validation(MISSING_INPUT));
    }

    let chart = decode_image(image).map_err(|e| {
        warn!(error = %e, "analyze image rejected");
        ApiError::validation("Invalid image data")
    })?;

    let analysis = state.analysis.analyze(script, &chart).await.map_err(|e| {
        error!(error = %e, ticker = %script, "analysis failed");
        ApiError::dependency("Analysis failed. Please try again.")
    })?;

    info!(ticker = %script, bytes = chart.bytes.len(), "analysis served");
    Ok(Json(AnalyzeResponse { analysis }))
}

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, instrument, warn};

use crate::{
    content::store::ContentError,
    errors::ApiError,
    state::AppState,
};

pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(news))
        .route("/market-summary", get(market_summary))
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "all".into()
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::NotFound(_) => {
                warn!(error = %e, "content file missing");
                ApiError::not_found(e.to_string())
            }
            ContentError::Malformed { .. } => {
                error!(error = %e, "content file malformed");
                ApiError::dependency("Error decoding the JSON file")
            }
            ContentError::Io { .. } => {
                error!(error = %e, "content file unreadable");
                ApiError::dependency("Error reading the content file")
            }
        }
    }
}

#[instrument(skip(state))]
pub async fn news(
    State(state): State<AppState>,
    Query(q): Query<NewsQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let doc = state.content.news().await?;
    Ok(Json(doc.select(&q.category)))
}

#[instrument(skip(state))]
pub async fn market_summary(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summary = state.content.market_summary().await?;
    Ok(Json(summary))
}

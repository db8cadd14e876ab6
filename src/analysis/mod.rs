pub mod handlers;
pub mod image;
pub mod provider;

pub use image::{decode_image, ChartImage};
pub use provider::{AnalysisProvider, GeminiClient};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::analysis_routes()
}

pub mod handlers;
pub mod store;

pub use store::{ContentError, ContentStore, FsContentStore, NewsDocument};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::content_routes()
}

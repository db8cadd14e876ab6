use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, MessageResponse, ProtectedResponse, RegisterRequest},
        extractors::AuthUser,
        services::AuthError,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/protected", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "register body rejected");
        AuthError::MissingFields("Missing required fields")
    })?;

    state.auth.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Registration successful".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "login body rejected");
        AuthError::MissingFields("Missing email or password")
    })?;

    let res = state.auth.login(payload).await?;
    Ok(Json(res))
}

#[instrument(skip_all)]
pub async fn protected(AuthUser(email): AuthUser) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        logged_in_as: email,
    })
}

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::services::{AuthError, AuthService};

/// Extracts and validates the bearer token, yielding the caller's email.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let email = AuthService::from_ref(state)
            .verify_protected(token)
            .map_err(|e| {
                warn!(error = %e, path = %parts.uri.path(), "bearer token rejected");
                e
            })?;
        Ok(AuthUser(email))
    }
}

/// Read `Authorization: Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Route layer that admits only requests carrying a valid token.
pub async fn require_bearer(_user: AuthUser, req: Request, next: Next) -> Response {
    next.run(req).await
}

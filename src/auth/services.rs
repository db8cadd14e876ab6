use std::{sync::Arc, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest},
        jwt::{JwtKeys, TokenError},
        password::PasswordHasher,
        repo::{StoreError, UserStore},
        repo_types::NewUser,
    },
    errors::ErrorKind,
};

/// Why an auth request was rejected. The display text is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Missing Authorization Header")]
    MissingToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    /// Store or crypto failure; the cause is logged where it happens.
    #[error("{0}")]
    Dependency(&'static str),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingFields(_) => ErrorKind::Validation,
            AuthError::DuplicateEmail => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalid => ErrorKind::Auth,
            AuthError::Dependency(_) => ErrorKind::Dependency,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = MessageResponse {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Present and not blank.
fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.trim().is_empty())
}

/// Registration, login and token verification over a [`UserStore`].
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.keys.access_ttl
    }

    /// Create an account. Does not log the user in.
    pub async fn register(&self, req: RegisterRequest) -> Result<(), AuthError> {
        let (Some(full_name), Some(email), Some(password)) = (
            required(&req.full_name),
            required(&req.email),
            required(&req.password),
        ) else {
            return Err(AuthError::MissingFields("Missing required fields"));
        };

        match self.users.find_by_email(email).await {
            Ok(Some(_)) => {
                warn!(email = %email, "email already registered");
                return Err(AuthError::DuplicateEmail);
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(AuthError::Dependency("Registration failed"));
            }
        }

        let hash = self
            .hasher
            .hash_blocking(password.to_string())
            .await
            .map_err(|e| {
                error!(error = %e, "hash_password failed");
                AuthError::Dependency("Registration failed")
            })?;

        let new_user = NewUser {
            full_name,
            email,
            password_hash: &hash,
        };
        match self.users.create(new_user).await {
            Ok(id) => {
                info!(user_id = %id, email = %email, "user registered");
                Ok(())
            }
            Err(StoreError::DuplicateEmail) => {
                warn!(email = %email, "lost registration race on email");
                Err(AuthError::DuplicateEmail)
            }
            Err(e) => {
                error!(error = %e, "create user failed");
                Err(AuthError::Dependency("Registration failed"))
            }
        }
    }

    /// Check credentials and issue a token whose subject is the email.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AuthError> {
        let (Some(email), Some(password)) = (required(&req.email), required(&req.password))
        else {
            return Err(AuthError::MissingFields("Missing email or password"));
        };

        let user = match self.users.find_by_email(email).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(AuthError::Dependency("Login failed"));
            }
        };

        let ok = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await;
        if !ok {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self
            .keys
            .issue(&user.email, self.token_ttl())
            .map_err(|e| {
                error!(error = %e, "jwt sign failed");
                AuthError::Dependency("Login failed")
            })?;

        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(LoginResponse {
            token,
            user: PublicUser {
                email: user.email,
                full_name: user.full_name,
            },
        })
    }

    /// Resolve the caller's email from a bearer token. Never touches the store.
    pub fn verify_protected(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.keys.verify(token)?;
        Ok(claims.sub)
    }
}

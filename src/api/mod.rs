//! API handlers for Librarium REST endpoints

pub mod auth;
pub mod authors;
pub mod books;
pub mod categories;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{error::AppError, models::user::UserClaims, AppState};

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Extractor for routes that behave differently for authenticated callers
/// but do not require a credential (e.g. registration, where only an admin
/// caller may assign roles). An invalid token is still rejected.
pub struct MaybeAuthenticatedUser(pub Option<UserClaims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => {
                let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
                    .map_err(|e| AppError::Authentication(e.to_string()))?;
                Ok(MaybeAuthenticatedUser(Some(claims)))
            }
            None => Ok(MaybeAuthenticatedUser(None)),
        }
    }
}

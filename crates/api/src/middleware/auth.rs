//! JWT-based authentication extractors for Axum handlers.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use hailango_core::error::CoreError;
use hailango_core::types::UserId;
use serde::Deserialize;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a JWT Bearer token in the `Authorization` header.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's id (from `claims.sub`).
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        authenticate(token, state)
    }
}

/// Authenticated user for the WebSocket upgrade.
///
/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also be passed as `?token=<jwt>`. The query parameter wins when both
/// are present.
#[derive(Debug, Clone)]
pub struct WsAuthUser {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for WsAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let from_query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty());

        let user = match from_query {
            Some(token) => authenticate(&token, state)?,
            None => authenticate(bearer_token(parts)?, state)?,
        };

        Ok(WsAuthUser {
            user_id: user.user_id,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing Authorization header".into(),
            ))
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized(
            "Invalid Authorization format. Expected: Bearer <token>".into(),
        ))
    })
}

fn authenticate(token: &str, state: &AppState) -> Result<AuthUser, AppError> {
    let claims = validate_token(token, &state.config.jwt).map_err(|_| {
        AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
    })?;

    Ok(AuthUser {
        user_id: claims.sub,
    })
}

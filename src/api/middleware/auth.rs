use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use std::sync::Arc;
use crate::auth::jwt::{Claims, SCOPE_SESSION};
use crate::error::AppError;
use crate::api::AppState;

/// Axum extractor that validates a Bearer session JWT.
/// Two-factor challenge tokens are refused here.
///
/// The account is re-read on every request: a deactivated or deleted admin
/// is rejected, and the role comes from the database, not the token.
pub struct AuthUser(pub Claims);

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::AuthFailed)?;

        let mut claims = crate::auth::jwt::verify_scoped(token, &state.jwt_secret, SCOPE_SESSION)
            .map_err(|_| AppError::AuthFailed)?;

        let account: Option<(String, String, bool)> =
            sqlx::query_as("SELECT username, role, is_active FROM admin_users WHERE id = ?")
                .bind(&claims.sub)
                .fetch_optional(&state.db)
                .await?;

        match account {
            Some((username, role, true)) => {
                claims.username = username;
                claims.role = role;
                Ok(AuthUser(claims))
            }
            _ => Err(AppError::AuthFailed),
        }
    }
}

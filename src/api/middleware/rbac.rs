use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;
use crate::auth::jwt::Claims;
use crate::auth::rbac::{has_permission, Permission};
use crate::error::AppError;
use crate::api::AppState;
use super::auth::AuthUser;

/// Axum extractor that requires the `super_admin` role.
/// Returns 403 Forbidden for other authenticated admins.
pub struct SuperAdmin(pub Claims);

impl FromRequestParts<Arc<AppState>> for SuperAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if has_permission(&claims.role, &Permission::ManageUsers) {
            Ok(SuperAdmin(claims))
        } else {
            Err(AppError::Unauthorized("super_admin role required".to_string()))
        }
    }
}

/// Check a single permission for an already-authenticated caller.
pub fn require(claims: &Claims, permission: Permission) -> Result<(), AppError> {
    if has_permission(&claims.role, &permission) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!("{:?} permission required", permission)))
    }
}

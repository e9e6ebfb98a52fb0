use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{load_user, save_code_state};
use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::rbac::SuperAdmin;
use crate::api::validators::registration::validate_email;
use crate::api::AppState;
use crate::auth::pin;
use crate::auth::rbac::{is_valid_role, ROLES};
use crate::auth::two_factor::EmailCodeState;
use crate::db::models::admin_user::{
    AdminUser, CreateAdminUserRequest, ResetPinRequest, UpdateAdminUserRequest, SELECT_ADMIN_USER,
};
use crate::db::{audit, is_unique_violation};
use crate::error::{AppError, AppResult};

fn validate_role(role: &str) -> AppResult<()> {
    if is_valid_role(role) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Invalid role: {}. Must be one of: {}",
            role,
            ROLES.join(", ")
        )))
    }
}

fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AppError::Validation("Username must be 3-50 characters".to_string()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AppError::Validation(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

fn validate_pin(value: &str) -> AppResult<()> {
    pin::validate_format(value).map_err(AppError::Validation)
}

async fn fetch_user(state: &AppState, id: &str) -> AppResult<AdminUser> {
    load_user(state, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

/// Error unless another active super admin would remain.
async fn ensure_other_super_admin(state: &AppState, user: &AdminUser) -> AppResult<()> {
    if user.role != "super_admin" || !user.is_active {
        return Ok(());
    }
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM admin_users WHERE role = 'super_admin' AND is_active = 1 AND id != ?"
    )
    .bind(&user.id)
    .fetch_one(&state.db)
    .await?;
    if count == 0 {
        return Err(AppError::Validation(
            "At least one active super_admin must remain".to_string(),
        ));
    }
    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _admin: SuperAdmin,
) -> AppResult<Json<Value>> {
    let sql = format!("{} ORDER BY created_at DESC", SELECT_ADMIN_USER);
    let rows: Vec<AdminUser> = sqlx::query_as(&sql).fetch_all(&state.db).await?;
    let count = rows.len();
    Ok(Json(json!({ "data": rows, "total": count })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    admin: SuperAdmin,
    ClientIp(ip): ClientIp,
    ApiJson(body): ApiJson<CreateAdminUserRequest>,
) -> AppResult<Json<Value>> {
    validate_role(&body.role)?;
    let username = body.username.trim().to_string();
    validate_username(&username)?;
    let email = body.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_pin(&body.pin)?;

    let id = Uuid::new_v4().to_string();
    let pin_hash = pin::hash(&body.pin)
        .map_err(|e| AppError::Internal(format!("PIN hashing failed: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO admin_users (id, username, email, pin_hash, role, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)"
    )
    .bind(&id)
    .bind(&username)
    .bind(&email)
    .bind(&pin_hash)
    .bind(&body.role)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Validation(format!("Username '{}' already exists", username))
        } else {
            AppError::Database(e)
        }
    })?;

    audit::record(&state.db, &admin.0, &ip, "create", "admin_user", Some(&id), Some(format!("{} ({})", username, body.role)));
    tracing::info!("Admin user {} created by {}", username, admin.0.username);

    let user = fetch_user(&state, &id).await?;
    Ok(Json(json!(user)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    admin: SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateAdminUserRequest>,
) -> AppResult<Json<Value>> {
    let user = fetch_user(&state, &id).await?;

    let email = match body.email {
        Some(ref e) => {
            let e = e.trim().to_lowercase();
            validate_email(&e)?;
            e
        }
        None => user.email.clone(),
    };
    let role = match body.role {
        Some(ref r) => {
            validate_role(r)?;
            r.clone()
        }
        None => user.role.clone(),
    };
    let is_active = body.is_active.unwrap_or(user.is_active);

    let demoting = role != "super_admin" || !is_active;
    if demoting {
        ensure_other_super_admin(&state, &user).await?;
    }
    if id == admin.0.sub && !is_active {
        return Err(AppError::Validation("You cannot deactivate your own account".to_string()));
    }

    sqlx::query("UPDATE admin_users SET email = ?, role = ?, is_active = ?, updated_at = ? WHERE id = ?")
        .bind(&email)
        .bind(&role)
        .bind(is_active)
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    audit::record(&state.db, &admin.0, &ip, "update", "admin_user", Some(&id), Some(format!("role={} active={}", role, is_active)));

    let user = fetch_user(&state, &id).await?;
    Ok(Json(json!(user)))
}

/// Set a new PIN. Any pending email code and lock are cleared with it.
pub async fn reset_pin(
    State(state): State<Arc<AppState>>,
    admin: SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ResetPinRequest>,
) -> AppResult<Json<Value>> {
    validate_pin(&body.pin)?;
    let user = fetch_user(&state, &id).await?;
    let pin_hash = pin::hash(&body.pin)
        .map_err(|e| AppError::Internal(format!("PIN hashing failed: {}", e)))?;

    sqlx::query("UPDATE admin_users SET pin_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&pin_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db)
        .await?;
    save_code_state(&state, &user.id, &EmailCodeState::cleared()).await?;

    audit::record(&state.db, &admin.0, &ip, "reset_pin", "admin_user", Some(&id), None);
    Ok(Json(json!({"success": true})))
}

pub async fn unlock(
    State(state): State<Arc<AppState>>,
    admin: SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = fetch_user(&state, &id).await?;
    save_code_state(&state, &user.id, &EmailCodeState::cleared()).await?;

    audit::record(&state.db, &admin.0, &ip, "unlock", "admin_user", Some(&id), None);
    tracing::info!("Admin user {} unlocked by {}", user.username, admin.0.username);
    Ok(Json(json!({"success": true})))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    admin: SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if id == admin.0.sub {
        return Err(AppError::Validation("You cannot delete your own account".to_string()));
    }
    let user = fetch_user(&state, &id).await?;
    ensure_other_super_admin(&state, &user).await?;

    sqlx::query("DELETE FROM admin_users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    audit::record(&state.db, &admin.0, &ip, "delete", "admin_user", Some(&id), Some(user.username));
    Ok(Json(json!({"success": true})))
}

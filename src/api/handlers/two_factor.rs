//! Second-factor management for the signed-in admin.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{claim_attempt, load_user, reject_attempt, release_attempt};
use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::auth::AuthUser;
use crate::api::AppState;
use crate::auth::two_factor::mask_email;
use crate::auth::{backup_codes, pin, totp};
use crate::db::audit;
use crate::db::models::admin_user::{AdminUser, METHOD_EMAIL, METHOD_TOTP};
use crate::error::{AppError, AppResult};

const TOTP_ISSUER: &str = "ClinicRegistry";

#[derive(Deserialize)]
pub struct EnableTotpRequest {
    code: String,
}

#[derive(Deserialize)]
pub struct DisableTotpRequest {
    pin: String,
}

async fn current_user(state: &AppState, auth: &AuthUser) -> AppResult<AdminUser> {
    load_user(state, &auth.0.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::AuthFailed)
}

/// Replace all backup codes for `user_id`; returns the plaintext set.
async fn replace_backup_codes(state: &AppState, user_id: &str) -> AppResult<Vec<String>> {
    let codes = backup_codes::generate();
    let now = Utc::now().to_rfc3339();

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM admin_backup_codes WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for code in &codes {
        sqlx::query(
            "INSERT INTO admin_backup_codes (id, user_id, code_hash, used_at, created_at)
             VALUES (?, ?, ?, NULL, ?)"
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(backup_codes::hash(code))
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(codes)
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    let (remaining,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM admin_backup_codes WHERE user_id = ? AND used_at IS NULL"
    )
    .bind(&user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "method": if user.uses_totp() { METHOD_TOTP } else { METHOD_EMAIL },
        "email_hint": mask_email(&user.email),
        "totp_enabled": user.totp_enabled,
        "totp_pending_setup": user.totp_secret.is_some() && !user.totp_enabled,
        "backup_codes_remaining": remaining,
        "code_status": user.code_state().status(Utc::now()).as_str(),
    })))
}

/// Generate a new authenticator secret and backup codes. The method only
/// switches after `/totp/enable` confirms a code.
pub async fn setup_totp(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    if user.totp_enabled {
        return Err(AppError::Validation(
            "Authenticator app already enabled; disable it first".to_string(),
        ));
    }

    let secret = totp::generate_secret();
    let sealed = state
        .secret_box
        .seal(&secret)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let secret_b32 = totp::secret_base32(&secret)?;

    sqlx::query(
        "UPDATE admin_users SET totp_secret = ?, totp_enabled = 0, totp_last_step = NULL, updated_at = ?
         WHERE id = ?"
    )
    .bind(&sealed)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let codes = replace_backup_codes(&state, &user.id).await?;
    audit::record(&state.db, &auth.0, &ip, "totp_setup", "admin_user", Some(&user.id), None);

    Ok(Json(json!({
        "secret": secret_b32,
        "otpauth_url": format!(
            "otpauth://totp/{issuer}:{user}?secret={secret}&issuer={issuer}&digits={digits}&period={period}",
            issuer = TOTP_ISSUER,
            user = user.username,
            secret = secret_b32,
            digits = totp::DIGITS,
            period = totp::STEP_SECS,
        ),
        "backup_codes": codes,
    })))
}

pub async fn enable_totp(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<EnableTotpRequest>,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    if user.totp_enabled {
        return Err(AppError::Validation("Authenticator app already enabled".to_string()));
    }
    let sealed = user.totp_secret.as_deref().ok_or_else(|| {
        AppError::Validation("Run authenticator setup before enabling it".to_string())
    })?;
    let secret = state
        .secret_box
        .open(sealed)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let step = match totp::verify(&secret, &req.code, Utc::now().timestamp() as u64, None)? {
        totp::TotpCheck::Accepted { step } => step,
        _ => return Err(AppError::Validation("Invalid authenticator code".to_string())),
    };

    sqlx::query(
        "UPDATE admin_users
         SET totp_enabled = 1, two_factor_method = ?, totp_last_step = ?, updated_at = ?
         WHERE id = ?"
    )
    .bind(METHOD_TOTP)
    .bind(step)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    audit::record(&state.db, &auth.0, &ip, "totp_enable", "admin_user", Some(&user.id), None);
    Ok(Json(json!({ "success": true, "method": METHOD_TOTP })))
}

/// Back to emailed codes. Requires the PIN again; a wrong PIN counts toward
/// the lockout like one at sign-in.
pub async fn disable_totp(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<DisableTotpRequest>,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    let now = Utc::now();
    let Some(claimed) = claim_attempt(&state, &user.id, now).await? else {
        return Err(AppError::Locked);
    };
    if !pin::verify(&req.pin, &user.pin_hash) {
        return Err(reject_attempt(&state, &user, &ip, &claimed, now, "wrong PIN").await);
    }
    release_attempt(&state, &user.id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "UPDATE admin_users
         SET totp_enabled = 0, two_factor_method = ?, totp_secret = NULL, totp_last_step = NULL, updated_at = ?
         WHERE id = ?"
    )
    .bind(METHOD_EMAIL)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM admin_backup_codes WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    audit::record(&state.db, &auth.0, &ip, "totp_disable", "admin_user", Some(&user.id), None);
    Ok(Json(json!({ "success": true, "method": METHOD_EMAIL })))
}

pub async fn regenerate_backup_codes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
) -> AppResult<Json<Value>> {
    let user = current_user(&state, &auth).await?;
    if user.totp_secret.is_none() {
        return Err(AppError::Validation(
            "Backup codes are only available with an authenticator app".to_string(),
        ));
    }

    let codes = replace_backup_codes(&state, &user.id).await?;
    audit::record(&state.db, &auth.0, &ip, "backup_codes_regenerate", "admin_user", Some(&user.id), None);
    Ok(Json(json!({ "backup_codes": codes })))
}

//! Time-limited links to a single attachment.
//!
//! A share is valid while `now < expires_at` and, when `max_views` is set,
//! `view_count < max_views`. The public fetch counts a view atomically so two
//! concurrent requests cannot both take the last one.

use axum::{
    extract::{Path, State},
    Json,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::auth::AuthUser;
use crate::api::AppState;
use crate::db::models::share::{CreateShareRequest, Share};
use crate::db::{audit, parse_ts, ts};
use crate::error::{AppError, AppResult};
use crate::metrics::ApiMetrics;

const TOKEN_BYTES: usize = 32;

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn share_url(base: &str, token: &str) -> String {
    format!("{}/api/shared-attachment/{}", base, token)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateShareRequest>,
) -> AppResult<Json<Value>> {
    let hours = req.expires_in_hours.unwrap_or(state.shares.default_ttl_hours);
    if hours < 1 || hours > state.shares.max_ttl_hours {
        return Err(AppError::Validation(format!(
            "expires_in_hours: must be between 1 and {}",
            state.shares.max_ttl_hours
        )));
    }
    if matches!(req.max_views, Some(v) if v < 1) {
        return Err(AppError::Validation("max_views: must be at least 1".to_string()));
    }

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM attachments WHERE id = ?")
        .bind(&req.attachment_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("Attachment {} not found", req.attachment_id)));
    }

    let now = Utc::now();
    let share = Share {
        id: Uuid::new_v4().to_string(),
        token: new_token(),
        attachment_id: req.attachment_id,
        created_by: auth.0.username.clone(),
        expires_at: ts(now + Duration::hours(hours)),
        max_views: req.max_views,
        view_count: 0,
        created_at: ts(now),
    };

    sqlx::query(
        "INSERT INTO temporary_shares
            (id, token, attachment_id, created_by, expires_at, max_views, view_count, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, ?)"
    )
    .bind(&share.id)
    .bind(&share.token)
    .bind(&share.attachment_id)
    .bind(&share.created_by)
    .bind(&share.expires_at)
    .bind(share.max_views)
    .bind(&share.created_at)
    .execute(&state.db)
    .await?;

    ApiMetrics::inc(&state.metrics.shares_created);
    audit::record(
        &state.db, &auth.0, &ip, "create", "share", Some(&share.id),
        Some(format!("attachment {} for {}h", share.attachment_id, hours)),
    );

    Ok(Json(json!({
        "id": share.id,
        "token": share.token,
        "url": share_url(&state.public_base_url, &share.token),
        "expires_at": share.expires_at,
        "max_views": share.max_views,
    })))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM temporary_shares WHERE token = ?")
        .bind(&token)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Share not found".to_string()));
    }

    audit::record(&state.db, &auth.0, &ip, "revoke", "share", None, None);
    Ok(Json(json!({"success": true})))
}

/// Public endpoint: the token is the credential.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let share: Share = sqlx::query_as(
        "SELECT id, token, attachment_id, created_by, expires_at, max_views, view_count, created_at
         FROM temporary_shares WHERE token = ?"
    )
    .bind(&token)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

    let now = Utc::now();
    let expired = parse_ts(&share.expires_at).map_or(true, |at| now >= at);
    if expired {
        return Err(AppError::Gone("This share link has expired".to_string()));
    }

    let claimed = sqlx::query(
        "UPDATE temporary_shares SET view_count = view_count + 1
         WHERE id = ? AND expires_at > ? AND (max_views IS NULL OR view_count < max_views)"
    )
    .bind(&share.id)
    .bind(ts(now))
    .execute(&state.db)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(AppError::Gone("This share link has reached its view limit".to_string()));
    }

    let (filename, content_type, size_bytes, data): (String, String, i64, Vec<u8>) = sqlx::query_as(
        "SELECT filename, content_type, size_bytes, data FROM attachments WHERE id = ?"
    )
    .bind(&share.attachment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Attachment no longer exists".to_string()))?;

    ApiMetrics::inc(&state.metrics.shares_accessed);
    audit::record_raw(
        state.db.clone(),
        String::new(),
        "anonymous".to_string(),
        "access",
        "share",
        Some(share.id.clone()),
        Some(format!("view {}", share.view_count + 1)),
        ip,
    );

    Ok(Json(json!({
        "filename": filename,
        "content_type": content_type,
        "size_bytes": size_bytes,
        "data": STANDARD.encode(&data),
        "views_remaining": share.max_views.map(|m| (m - share.view_count - 1).max(0)),
    })))
}

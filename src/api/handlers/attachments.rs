use axum::{
    extract::{Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::registrations::fetch_registration;
use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::auth::AuthUser;
use crate::api::validators::{max_len, required};
use crate::api::AppState;
use crate::db::audit;
use crate::db::models::attachment::{AttachmentMeta, UploadAttachmentRequest, SELECT_ATTACHMENT_META};
use crate::error::{AppError, AppResult};

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;
    let sql = format!("{} WHERE registration_id = ? ORDER BY created_at DESC", SELECT_ATTACHMENT_META);
    let rows: Vec<AttachmentMeta> = sqlx::query_as(&sql)
        .bind(&id)
        .fetch_all(&state.db)
        .await?;
    let total = rows.len();
    Ok(Json(json!({ "data": rows, "total": total })))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UploadAttachmentRequest>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;

    let filename = required("filename", &req.filename)?;
    max_len("filename", &filename, 255)?;
    if filename.contains('/') || filename.contains('\\') {
        return Err(AppError::Validation("filename: must not contain path separators".to_string()));
    }

    let data = STANDARD
        .decode(req.data.trim())
        .map_err(|_| AppError::Validation("data: must be base64".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("data: file is empty".to_string()));
    }
    if data.len() > state.shares.max_attachment_bytes {
        return Err(AppError::Validation(format!(
            "data: file exceeds {} bytes",
            state.shares.max_attachment_bytes
        )));
    }

    let meta = AttachmentMeta {
        id: Uuid::new_v4().to_string(),
        registration_id: id,
        filename,
        content_type: req.content_type,
        size_bytes: data.len() as i64,
        uploaded_by: auth.0.username.clone(),
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO attachments
            (id, registration_id, filename, content_type, size_bytes, data, uploaded_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&meta.id)
    .bind(&meta.registration_id)
    .bind(&meta.filename)
    .bind(&meta.content_type)
    .bind(meta.size_bytes)
    .bind(&data)
    .bind(&meta.uploaded_by)
    .bind(&meta.created_at)
    .execute(&state.db)
    .await?;

    audit::record(
        &state.db, &auth.0, &ip, "upload", "attachment", Some(&meta.id),
        Some(format!("{} ({} bytes)", meta.filename, meta.size_bytes)),
    );

    Ok(Json(json!(meta)))
}

/// Also revokes every share pointing at the attachment.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path((id, attachment_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM attachments WHERE id = ? AND registration_id = ?")
        .bind(&attachment_id)
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Attachment {} not found", attachment_id)));
    }

    audit::record(&state.db, &auth.0, &ip, "delete", "attachment", Some(&attachment_id), None);
    Ok(Json(json!({"success": true})))
}

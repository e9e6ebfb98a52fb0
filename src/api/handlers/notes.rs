use axum::{
    extract::{Path, State},
    Json,
};
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
use crate::db::models::note::{Note, NoteRequest};
use crate::error::{AppError, AppResult};

const MAX_NOTE_LEN: usize = 10_000;

fn note_content(req: &NoteRequest) -> AppResult<String> {
    let content = required("content", &req.content)?;
    max_len("content", &content, MAX_NOTE_LEN)?;
    Ok(content)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;
    let rows: Vec<Note> = sqlx::query_as(
        "SELECT id, registration_id, content, author, created_at, updated_at
         FROM registration_notes WHERE registration_id = ? ORDER BY created_at ASC"
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;
    let total = rows.len();
    Ok(Json(json!({ "data": rows, "total": total })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<NoteRequest>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;
    let content = note_content(&req)?;
    let now = Utc::now().to_rfc3339();
    let note = Note {
        id: Uuid::new_v4().to_string(),
        registration_id: id,
        content,
        author: auth.0.username.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO registration_notes (id, registration_id, content, author, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(&note.id)
    .bind(&note.registration_id)
    .bind(&note.content)
    .bind(&note.author)
    .bind(&note.created_at)
    .bind(&note.updated_at)
    .execute(&state.db)
    .await?;

    audit::record(&state.db, &auth.0, &ip, "create", "note", Some(&note.id), None);
    Ok(Json(json!(note)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path((id, note_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<NoteRequest>,
) -> AppResult<Json<Value>> {
    let content = note_content(&req)?;
    let now = Utc::now().to_rfc3339();

    let note: Note = sqlx::query_as(
        "UPDATE registration_notes SET content = ?, updated_at = ?
         WHERE id = ? AND registration_id = ?
         RETURNING id, registration_id, content, author, created_at, updated_at"
    )
    .bind(&content)
    .bind(&now)
    .bind(&note_id)
    .bind(&id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Note {} not found", note_id)))?;

    audit::record(&state.db, &auth.0, &ip, "update", "note", Some(&note_id), None);
    Ok(Json(json!(note)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path((id, note_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM registration_notes WHERE id = ? AND registration_id = ?")
        .bind(&note_id)
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Note {} not found", note_id)));
    }

    audit::record(&state.db, &auth.0, &ip, "delete", "note", Some(&note_id), None);
    Ok(Json(json!({"success": true})))
}

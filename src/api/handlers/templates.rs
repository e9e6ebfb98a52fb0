use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::auth::AuthUser;
use crate::api::middleware::rbac::require;
use crate::api::validators::{max_len, required};
use crate::api::AppState;
use crate::auth::rbac::Permission;
use crate::db::models::template::{
    CreateTemplateRequest, Template, TemplateKind, UpdateTemplateRequest,
};
use crate::db::{audit, is_unique_violation};
use crate::error::{AppError, AppResult};

const MAX_NAME_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 20_000;

fn duplicate_name(kind: TemplateKind, name: &str) -> AppError {
    AppError::Validation(format!("{} '{}' already exists", kind.label(), name))
}

async fn fetch(state: &AppState, kind: TemplateKind, id: &str) -> AppResult<Template> {
    let sql = format!(
        "SELECT id, name, content, is_default, created_at, updated_at FROM {} WHERE id = ?",
        kind.table()
    );
    sqlx::query_as::<_, Template>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.label(), id)))
}

/// At most one default per kind: setting a new one clears the rest.
async fn clear_default(
    tx: &mut sqlx::SqliteConnection,
    kind: TemplateKind,
    except_id: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE {} SET is_default = 0 WHERE id != ?", kind.table());
    sqlx::query(&sql).bind(except_id).execute(tx).await?;
    Ok(())
}

async fn list(state: &AppState, kind: TemplateKind) -> AppResult<Json<Value>> {
    let sql = format!(
        "SELECT id, name, content, is_default, created_at, updated_at FROM {}
         ORDER BY is_default DESC, name ASC",
        kind.table()
    );
    let rows: Vec<Template> = sqlx::query_as(&sql).fetch_all(&state.db).await?;
    let total = rows.len();
    Ok(Json(json!({ "data": rows, "total": total })))
}

async fn create(
    state: &AppState,
    kind: TemplateKind,
    auth: &AuthUser,
    ip: &str,
    req: CreateTemplateRequest,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let name = required("name", &req.name)?;
    max_len("name", &name, MAX_NAME_LEN)?;
    let content = required("content", &req.content)?;
    max_len("content", &content, MAX_CONTENT_LEN)?;

    let now = Utc::now().to_rfc3339();
    let template = Template {
        id: Uuid::new_v4().to_string(),
        name,
        content,
        is_default: req.is_default,
        created_at: now.clone(),
        updated_at: now,
    };

    let mut tx = state.db.begin().await?;
    let sql = format!(
        "INSERT INTO {} (id, name, content, is_default, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.content)
        .bind(template.is_default)
        .bind(&template.created_at)
        .bind(&template.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_name(kind, &template.name)
            } else {
                AppError::Database(e)
            }
        })?;
    if template.is_default {
        clear_default(&mut *tx, kind, &template.id).await?;
    }
    tx.commit().await?;

    audit::record(&state.db, &auth.0, ip, "create", kind.resource(), Some(&template.id), Some(template.name.clone()));
    Ok(Json(json!(template)))
}

async fn update(
    state: &AppState,
    kind: TemplateKind,
    auth: &AuthUser,
    ip: &str,
    id: &str,
    req: UpdateTemplateRequest,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let mut template = fetch(state, kind, id).await?;

    if let Some(ref name) = req.name {
        let name = required("name", name)?;
        max_len("name", &name, MAX_NAME_LEN)?;
        template.name = name;
    }
    if let Some(ref content) = req.content {
        let content = required("content", content)?;
        max_len("content", &content, MAX_CONTENT_LEN)?;
        template.content = content;
    }
    if let Some(is_default) = req.is_default {
        template.is_default = is_default;
    }
    template.updated_at = Utc::now().to_rfc3339();

    let mut tx = state.db.begin().await?;
    let sql = format!(
        "UPDATE {} SET name = ?, content = ?, is_default = ?, updated_at = ? WHERE id = ?",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(&template.name)
        .bind(&template.content)
        .bind(template.is_default)
        .bind(&template.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_name(kind, &template.name)
            } else {
                AppError::Database(e)
            }
        })?;
    if template.is_default {
        clear_default(&mut *tx, kind, id).await?;
    }
    tx.commit().await?;

    audit::record(&state.db, &auth.0, ip, "update", kind.resource(), Some(id), None);
    Ok(Json(json!(template)))
}

async fn delete(
    state: &AppState,
    kind: TemplateKind,
    auth: &AuthUser,
    ip: &str,
    id: &str,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let template = fetch(state, kind, id).await?;
    if template.is_default {
        return Err(AppError::Validation(format!(
            "Cannot delete the default {}",
            kind.label().to_lowercase()
        )));
    }

    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    sqlx::query(&sql).bind(id).execute(&state.db).await?;

    audit::record(&state.db, &auth.0, ip, "delete", kind.resource(), Some(id), Some(template.name));
    Ok(Json(json!({"success": true})))
}

// Route wrappers, one set per template kind.

pub async fn list_clinical(State(state): State<Arc<AppState>>, _auth: AuthUser) -> AppResult<Json<Value>> {
    list(&state, TemplateKind::Clinical).await
}

pub async fn create_clinical(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateTemplateRequest>,
) -> AppResult<Json<Value>> {
    create(&state, TemplateKind::Clinical, &auth, &ip, req).await
}

pub async fn update_clinical(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTemplateRequest>,
) -> AppResult<Json<Value>> {
    update(&state, TemplateKind::Clinical, &auth, &ip, &id, req).await
}

pub async fn delete_clinical(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    delete(&state, TemplateKind::Clinical, &auth, &ip, &id).await
}

pub async fn list_notes(State(state): State<Arc<AppState>>, _auth: AuthUser) -> AppResult<Json<Value>> {
    list(&state, TemplateKind::Notes).await
}

pub async fn create_notes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateTemplateRequest>,
) -> AppResult<Json<Value>> {
    create(&state, TemplateKind::Notes, &auth, &ip, req).await
}

pub async fn update_notes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTemplateRequest>,
) -> AppResult<Json<Value>> {
    update(&state, TemplateKind::Notes, &auth, &ip, &id, req).await
}

pub async fn delete_notes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    delete(&state, TemplateKind::Notes, &auth, &ip, &id).await
}

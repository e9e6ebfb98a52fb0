use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::extract::{ApiJson, ClientIp};
use crate::api::middleware::auth::AuthUser;
use crate::api::middleware::rbac::require;
use crate::api::validators::{max_len, optional, required};
use crate::api::AppState;
use crate::auth::rbac::Permission;
use crate::db::models::disposition::{
    CreateDispositionRequest, Disposition, UpdateDispositionRequest,
};
use crate::db::{audit, is_unique_violation};
use crate::error::{AppError, AppResult};

const SELECT_DISPOSITION: &str =
    "SELECT id, name, description, is_default, is_active, sort_order, created_at, updated_at
     FROM dispositions";

#[derive(Deserialize)]
pub struct DispositionListParams {
    #[serde(default)]
    pub include_inactive: bool,
}

fn map_unique(e: sqlx::Error, name: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Validation(format!("Disposition '{}' already exists", name))
    } else {
        AppError::Database(e)
    }
}

async fn fetch(state: &AppState, id: &str) -> AppResult<Disposition> {
    let sql = format!("{} WHERE id = ?", SELECT_DISPOSITION);
    sqlx::query_as::<_, Disposition>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Disposition {} not found", id)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(params): Query<DispositionListParams>,
) -> AppResult<Json<Value>> {
    let filter = if params.include_inactive { "" } else { "WHERE is_active = 1" };
    let sql = format!("{} {} ORDER BY sort_order ASC, name ASC", SELECT_DISPOSITION, filter);
    let rows: Vec<Disposition> = sqlx::query_as(&sql).fetch_all(&state.db).await?;
    let total = rows.len();
    Ok(Json(json!({ "data": rows, "total": total })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateDispositionRequest>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let name = required("name", &req.name)?;
    max_len("name", &name, 100)?;

    let now = Utc::now().to_rfc3339();
    let d = Disposition {
        id: Uuid::new_v4().to_string(),
        name,
        description: optional(req.description),
        is_default: false,
        is_active: true,
        sort_order: req.sort_order,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO dispositions (id, name, description, is_default, is_active, sort_order, created_at, updated_at)
         VALUES (?, ?, ?, 0, 1, ?, ?, ?)"
    )
    .bind(&d.id)
    .bind(&d.name)
    .bind(&d.description)
    .bind(d.sort_order)
    .bind(&d.created_at)
    .bind(&d.updated_at)
    .execute(&state.db)
    .await
    .map_err(|e| map_unique(e, &d.name))?;

    audit::record(&state.db, &auth.0, &ip, "create", "disposition", Some(&d.id), Some(d.name.clone()));
    Ok(Json(json!(d)))
}

/// Renames do not rewrite registrations that already carry the old name.
pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateDispositionRequest>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let mut d = fetch(&state, &id).await?;

    if let Some(ref name) = req.name {
        let name = required("name", name)?;
        max_len("name", &name, 100)?;
        d.name = name;
    }
    if req.description.is_some() {
        d.description = optional(req.description);
    }
    if let Some(order) = req.sort_order {
        d.sort_order = order;
    }
    if let Some(active) = req.is_active {
        if !active && d.is_default {
            return Err(AppError::Validation(
                "Cannot deactivate the default disposition".to_string(),
            ));
        }
        d.is_active = active;
    }
    d.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE dispositions SET name = ?, description = ?, is_active = ?, sort_order = ?, updated_at = ?
         WHERE id = ?"
    )
    .bind(&d.name)
    .bind(&d.description)
    .bind(d.is_active)
    .bind(d.sort_order)
    .bind(&d.updated_at)
    .bind(&id)
    .execute(&state.db)
    .await
    .map_err(|e| map_unique(e, &d.name))?;

    audit::record(&state.db, &auth.0, &ip, "update", "disposition", Some(&id), None);
    Ok(Json(json!(d)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let d = fetch(&state, &id).await?;
    if d.is_default {
        return Err(AppError::Validation("Cannot delete the default disposition".to_string()));
    }

    sqlx::query("DELETE FROM dispositions WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    audit::record(&state.db, &auth.0, &ip, "delete", "disposition", Some(&id), Some(d.name));
    Ok(Json(json!({"success": true})))
}

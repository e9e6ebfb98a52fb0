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
use crate::api::validators::registration::validate_phone;
use crate::api::validators::{max_len, optional, required};
use crate::api::AppState;
use crate::auth::rbac::Permission;
use crate::db::models::referral_site::{
    CreateReferralSiteRequest, ReferralSite, UpdateReferralSiteRequest,
};
use crate::db::{audit, is_unique_violation};
use crate::error::{AppError, AppResult};

const SELECT_SITE: &str =
    "SELECT id, name, address, phone, is_active, created_at, updated_at FROM referral_sites";

#[derive(Deserialize)]
pub struct SiteListParams {
    #[serde(default)]
    pub include_inactive: bool,
}

fn map_unique(e: sqlx::Error, name: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Validation(format!("Referral site '{}' already exists", name))
    } else {
        AppError::Database(e)
    }
}

fn check_phone(phone: Option<&str>) -> AppResult<()> {
    if let Some(p) = phone {
        validate_phone(p)?;
    }
    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(params): Query<SiteListParams>,
) -> AppResult<Json<Value>> {
    let filter = if params.include_inactive { "" } else { "WHERE is_active = 1" };
    let sql = format!("{} {} ORDER BY name ASC", SELECT_SITE, filter);
    let rows: Vec<ReferralSite> = sqlx::query_as(&sql).fetch_all(&state.db).await?;
    let total = rows.len();
    Ok(Json(json!({ "data": rows, "total": total })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<CreateReferralSiteRequest>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let name = required("name", &req.name)?;
    max_len("name", &name, 150)?;
    let phone = optional(req.phone);
    check_phone(phone.as_deref())?;

    let now = Utc::now().to_rfc3339();
    let site = ReferralSite {
        id: Uuid::new_v4().to_string(),
        name,
        address: optional(req.address),
        phone,
        is_active: true,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO referral_sites (id, name, address, phone, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, 1, ?, ?)"
    )
    .bind(&site.id)
    .bind(&site.name)
    .bind(&site.address)
    .bind(&site.phone)
    .bind(&site.created_at)
    .bind(&site.updated_at)
    .execute(&state.db)
    .await
    .map_err(|e| map_unique(e, &site.name))?;

    audit::record(&state.db, &auth.0, &ip, "create", "referral_site", Some(&site.id), Some(site.name.clone()));
    Ok(Json(json!(site)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateReferralSiteRequest>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let sql = format!("{} WHERE id = ?", SELECT_SITE);
    let mut site: ReferralSite = sqlx::query_as(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Referral site {} not found", id)))?;

    if let Some(ref name) = req.name {
        let name = required("name", name)?;
        max_len("name", &name, 150)?;
        site.name = name;
    }
    if req.address.is_some() {
        site.address = optional(req.address);
    }
    if req.phone.is_some() {
        site.phone = optional(req.phone);
        check_phone(site.phone.as_deref())?;
    }
    if let Some(active) = req.is_active {
        site.is_active = active;
    }
    site.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE referral_sites SET name = ?, address = ?, phone = ?, is_active = ?, updated_at = ?
         WHERE id = ?"
    )
    .bind(&site.name)
    .bind(&site.address)
    .bind(&site.phone)
    .bind(site.is_active)
    .bind(&site.updated_at)
    .bind(&id)
    .execute(&state.db)
    .await
    .map_err(|e| map_unique(e, &site.name))?;

    audit::record(&state.db, &auth.0, &ip, "update", "referral_site", Some(&id), None);
    Ok(Json(json!(site)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ManageLookups)?;
    let result = sqlx::query("DELETE FROM referral_sites WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Referral site {} not found", id)));
    }

    audit::record(&state.db, &auth.0, &ip, "delete", "referral_site", Some(&id), None);
    Ok(Json(json!({"success": true})))
}

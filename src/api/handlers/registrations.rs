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
use crate::api::validators::registration::normalize_and_validate;
use crate::api::AppState;
use crate::db::audit;
use crate::db::models::registration::{
    CreateRegistrationRequest, Registration, UpdateRegistrationRequest, SELECT_REGISTRATION,
    STATUS_COMPLETED, STATUS_PENDING,
};
use crate::db::models::test_record::{TestRecord, SELECT_TEST_RECORD};
use crate::error::{AppError, AppResult};
use crate::metrics::ApiMetrics;

#[derive(Deserialize)]
pub struct RegistrationListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub disposition: Option<String>,
    /// Matches name, email or health card.
    pub search: Option<String>,
}

pub async fn fetch_registration(state: &AppState, id: &str) -> AppResult<Registration> {
    let sql = format!("{} WHERE id = ?", SELECT_REGISTRATION);
    sqlx::query_as::<_, Registration>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Registration {} not found", id)))
}

/// Disposition and referral site must name active lookup entries.
async fn check_lookups(state: &AppState, r: &Registration) -> AppResult<()> {
    if let Some(ref name) = r.disposition {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM dispositions WHERE name = ? AND is_active = 1")
                .bind(name)
                .fetch_optional(&state.db)
                .await?;
        if found.is_none() {
            return Err(AppError::Validation(format!("Unknown disposition '{}'", name)));
        }
    }
    if let Some(ref name) = r.referral_site {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM referral_sites WHERE name = ? AND is_active = 1")
                .bind(name)
                .fetch_optional(&state.db)
                .await?;
        if found.is_none() {
            return Err(AppError::Validation(format!("Unknown referral site '{}'", name)));
        }
    }
    Ok(())
}

/// A completed registration always carries a disposition.
fn check_completion(r: &Registration) -> AppResult<()> {
    if r.status == STATUS_COMPLETED && r.disposition.is_none() {
        return Err(AppError::Validation(
            "Assign a disposition before completing the registration".to_string(),
        ));
    }
    Ok(())
}

async fn default_disposition(state: &AppState) -> AppResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM dispositions WHERE is_default = 1 AND is_active = 1 ORDER BY sort_order LIMIT 1"
    )
    .fetch_optional(&state.db)
    .await?;
    Ok(row.map(|(name,)| name))
}

async fn write_registration(state: &AppState, r: &Registration) -> AppResult<()> {
    sqlx::query(
        "UPDATE admin_registrations SET
            first_name = ?, last_name = ?, date_of_birth = ?, health_card = ?, email = ?,
            phone = ?, gender = ?, address = ?, city = ?, postal_code = ?, language = ?,
            disposition = ?, referral_site = ?, physician = ?, consent = ?, status = ?,
            updated_at = ?
         WHERE id = ?"
    )
    .bind(&r.first_name)
    .bind(&r.last_name)
    .bind(&r.date_of_birth)
    .bind(&r.health_card)
    .bind(&r.email)
    .bind(&r.phone)
    .bind(&r.gender)
    .bind(&r.address)
    .bind(&r.city)
    .bind(&r.postal_code)
    .bind(&r.language)
    .bind(&r.disposition)
    .bind(&r.referral_site)
    .bind(&r.physician)
    .bind(r.consent)
    .bind(&r.status)
    .bind(&r.updated_at)
    .bind(&r.id)
    .execute(&state.db)
    .await?;
    Ok(())
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    ApiJson(body): ApiJson<CreateRegistrationRequest>,
) -> AppResult<Json<Value>> {
    let now = Utc::now();
    let draft = Registration {
        id: Uuid::new_v4().to_string(),
        first_name: body.first_name,
        last_name: body.last_name,
        date_of_birth: body.date_of_birth,
        health_card: body.health_card,
        email: body.email,
        phone: body.phone,
        gender: body.gender,
        address: body.address,
        city: body.city,
        postal_code: body.postal_code,
        language: body.language,
        disposition: body.disposition,
        referral_site: body.referral_site,
        physician: body.physician,
        consent: body.consent,
        status: STATUS_PENDING.to_string(),
        created_by: auth.0.username.clone(),
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
    };
    let mut r = normalize_and_validate(draft, now.date_naive())?;
    check_lookups(&state, &r).await?;
    if r.disposition.is_none() {
        r.disposition = default_disposition(&state).await?;
    }

    sqlx::query(
        "INSERT INTO admin_registrations (
            id, first_name, last_name, date_of_birth, health_card, email, phone, gender,
            address, city, postal_code, language, disposition, referral_site, physician,
            consent, status, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&r.id)
    .bind(&r.first_name)
    .bind(&r.last_name)
    .bind(&r.date_of_birth)
    .bind(&r.health_card)
    .bind(&r.email)
    .bind(&r.phone)
    .bind(&r.gender)
    .bind(&r.address)
    .bind(&r.city)
    .bind(&r.postal_code)
    .bind(&r.language)
    .bind(&r.disposition)
    .bind(&r.referral_site)
    .bind(&r.physician)
    .bind(r.consent)
    .bind(&r.status)
    .bind(&r.created_by)
    .bind(&r.created_at)
    .bind(&r.updated_at)
    .execute(&state.db)
    .await?;

    ApiMetrics::inc(&state.metrics.registrations_created);
    audit::record(&state.db, &auth.0, &ip, "create", "registration", Some(&r.id), None);
    tracing::info!("Registration {} created by {}", r.id, auth.0.username);

    Ok(Json(json!(r)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(params): Query<RegistrationListParams>,
) -> AppResult<Json<Value>> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(50).clamp(1, 200);
    let offset = (page - 1) * per_page;

    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()));

    let mut conditions: Vec<&str> = Vec::new();
    if params.status.is_some() {
        conditions.push("status = ?");
    }
    if params.disposition.is_some() {
        conditions.push("disposition = ?");
    }
    if search.is_some() {
        conditions.push(
            "(lower(first_name) LIKE ? OR lower(coalesce(last_name, '')) LIKE ? \
             OR lower(coalesce(email, '')) LIKE ? OR lower(coalesce(health_card, '')) LIKE ?)",
        );
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM admin_registrations {}", where_clause);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref v) = params.status { count_query = count_query.bind(v); }
    if let Some(ref v) = params.disposition { count_query = count_query.bind(v); }
    if let Some(ref v) = search {
        count_query = count_query.bind(v).bind(v).bind(v).bind(v);
    }
    let (total,) = count_query.fetch_one(&state.db).await?;

    let data_sql = format!(
        "{} {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        SELECT_REGISTRATION, where_clause
    );
    let mut data_query = sqlx::query_as::<_, Registration>(&data_sql);
    if let Some(ref v) = params.status { data_query = data_query.bind(v); }
    if let Some(ref v) = params.disposition { data_query = data_query.bind(v); }
    if let Some(ref v) = search {
        data_query = data_query.bind(v).bind(v).bind(v).bind(v);
    }
    let rows = data_query.bind(per_page).bind(offset).fetch_all(&state.db).await?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

/// Registration with its test records inline.
pub async fn get(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let r = fetch_registration(&state, &id).await?;
    let sql = format!("{} WHERE registration_id = ? ORDER BY created_at DESC", SELECT_TEST_RECORD);
    let tests: Vec<TestRecord> = sqlx::query_as(&sql)
        .bind(&id)
        .fetch_all(&state.db)
        .await?;

    let mut value = serde_json::to_value(&r)?;
    value["tests"] = json!(tests);
    Ok(Json(value))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateRegistrationRequest>,
) -> AppResult<Json<Value>> {
    let existing = fetch_registration(&state, &id).await?;
    let lookups_changed = body.disposition.is_some() || body.referral_site.is_some();

    let now = Utc::now();
    let mut merged = existing.apply(body);
    merged.updated_at = now.to_rfc3339();
    let merged = normalize_and_validate(merged, now.date_naive())?;
    check_completion(&merged)?;
    if lookups_changed {
        check_lookups(&state, &merged).await?;
    }

    write_registration(&state, &merged).await?;
    audit::record(&state.db, &auth.0, &ip, "update", "registration", Some(&id), None);

    Ok(Json(json!(merged)))
}

/// Close out a registration. A disposition is required first.
pub async fn finalize(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut r = fetch_registration(&state, &id).await?;
    if r.status == STATUS_COMPLETED {
        return Err(AppError::Validation("Registration is already completed".to_string()));
    }
    r.status = STATUS_COMPLETED.to_string();
    check_completion(&r)?;
    r.updated_at = Utc::now().to_rfc3339();
    write_registration(&state, &r).await?;
    audit::record(&state.db, &auth.0, &ip, "finalize", "registration", Some(&id), None);

    Ok(Json(json!(r)))
}

/// Tests, notes, attachments and their shares go with it.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM admin_registrations WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Registration {} not found", id)));
    }

    audit::record(&state.db, &auth.0, &ip, "delete", "registration", Some(&id), None);
    Ok(Json(json!({"success": true})))
}

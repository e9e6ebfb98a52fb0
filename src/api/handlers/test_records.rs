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
use crate::api::validators::{max_len, optional, registration::parse_date};
use crate::api::AppState;
use crate::db::audit;
use crate::db::models::test_record::{
    CreateTestRequest, TestRecord, UpdateTestRequest, SELECT_TEST_RECORD,
};
use crate::error::{AppError, AppResult};

const MAX_NOTES_LEN: usize = 4000;

fn check_fields(test_date: Option<&str>, notes: Option<&str>) -> AppResult<()> {
    if let Some(d) = test_date {
        parse_date("test_date", d)?;
    }
    if let Some(n) = notes {
        max_len("notes", n, MAX_NOTES_LEN)?;
    }
    Ok(())
}

async fn fetch_test(state: &AppState, registration_id: &str, test_id: &str) -> AppResult<TestRecord> {
    let sql = format!("{} WHERE id = ? AND registration_id = ?", SELECT_TEST_RECORD);
    sqlx::query_as::<_, TestRecord>(&sql)
        .bind(test_id)
        .bind(registration_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test {} not found", test_id)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;
    let sql = format!("{} WHERE registration_id = ? ORDER BY created_at DESC", SELECT_TEST_RECORD);
    let rows: Vec<TestRecord> = sqlx::query_as(&sql)
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
    ApiJson(body): ApiJson<CreateTestRequest>,
) -> AppResult<Json<Value>> {
    fetch_registration(&state, &id).await?;
    let test_date = optional(body.test_date);
    let notes = optional(body.notes);
    check_fields(test_date.as_deref(), notes.as_deref())?;

    let now = Utc::now().to_rfc3339();
    let record = TestRecord {
        id: Uuid::new_v4().to_string(),
        registration_id: id.clone(),
        test_type: body.test_type.as_str().to_string(),
        result: body.result.as_str().to_string(),
        test_date,
        notes,
        created_by: auth.0.username.clone(),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO test_records
            (id, registration_id, test_type, result, test_date, notes, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&record.id)
    .bind(&record.registration_id)
    .bind(&record.test_type)
    .bind(&record.result)
    .bind(&record.test_date)
    .bind(&record.notes)
    .bind(&record.created_by)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(&state.db)
    .await?;

    audit::record(
        &state.db, &auth.0, &ip, "create", "test_record", Some(&record.id),
        Some(format!("{} for registration {}", record.test_type, id)),
    );

    Ok(Json(json!(record)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path((id, test_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<UpdateTestRequest>,
) -> AppResult<Json<Value>> {
    let mut record = fetch_test(&state, &id, &test_id).await?;

    if let Some(t) = body.test_type {
        record.test_type = t.as_str().to_string();
    }
    if let Some(r) = body.result {
        record.result = r.as_str().to_string();
    }
    if body.test_date.is_some() {
        record.test_date = optional(body.test_date);
    }
    if body.notes.is_some() {
        record.notes = optional(body.notes);
    }
    check_fields(record.test_date.as_deref(), record.notes.as_deref())?;
    record.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE test_records SET test_type = ?, result = ?, test_date = ?, notes = ?, updated_at = ?
         WHERE id = ?"
    )
    .bind(&record.test_type)
    .bind(&record.result)
    .bind(&record.test_date)
    .bind(&record.notes)
    .bind(&record.updated_at)
    .bind(&record.id)
    .execute(&state.db)
    .await?;

    audit::record(
        &state.db, &auth.0, &ip, "update", "test_record", Some(&test_id),
        Some(format!("result={}", record.result)),
    );

    Ok(Json(json!(record)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path((id, test_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM test_records WHERE id = ? AND registration_id = ?")
        .bind(&test_id)
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Test {} not found", test_id)));
    }

    audit::record(&state.db, &auth.0, &ip, "delete", "test_record", Some(&test_id), None);
    Ok(Json(json!({"success": true})))
}

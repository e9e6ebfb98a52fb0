use axum::{extract::{Query, State}, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::AppState;
use crate::api::middleware::auth::AuthUser;
use crate::api::middleware::rbac::require;
use crate::auth::rbac::Permission;
use crate::db::{parse_ts, ts};
use crate::error::{AppError, AppResult};

#[derive(Deserialize)]
pub struct AuditLogParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    /// RFC 3339 lower bound on `time`, any offset.
    pub since: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
struct AuditEntry {
    id: i64,
    time: String,
    user_id: String,
    username: String,
    action: String,
    resource: String,
    resource_id: Option<String>,
    detail: Option<String>,
    ip: String,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<AuditLogParams>,
) -> AppResult<Json<Value>> {
    require(&auth.0, Permission::ReadAuditLog)?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(50).clamp(1, 200);
    let offset = (page - 1) * per_page;

    // Stored times are fixed-width UTC, so the bound must be too.
    let since = match params.since.as_deref() {
        Some(raw) => Some(ts(parse_ts(raw.trim()).ok_or_else(|| {
            AppError::Validation(format!("Invalid since timestamp: {}", raw))
        })?)),
        None => None,
    };

    let filters: Vec<(&str, &String)> = [
        ("user_id = ?", params.user_id.as_ref()),
        ("action = ?", params.action.as_ref()),
        ("resource = ?", params.resource.as_ref()),
        ("resource_id = ?", params.resource_id.as_ref()),
        ("time >= ?", since.as_ref()),
    ]
    .into_iter()
    .filter_map(|(cond, v)| v.map(|v| (cond, v)))
    .collect();

    let where_clause = if filters.is_empty() {
        String::new()
    } else {
        let conds: Vec<&str> = filters.iter().map(|(c, _)| *c).collect();
        format!("WHERE {}", conds.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_log {}", where_clause);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for (_, v) in &filters {
        count_query = count_query.bind(*v);
    }
    let (total,) = count_query.fetch_one(&state.db).await?;

    let data_sql = format!(
        "SELECT id, time, user_id, username, action, resource, resource_id, detail, ip \
         FROM audit_log {} ORDER BY time DESC, id DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut data_query = sqlx::query_as::<_, AuditEntry>(&data_sql);
    for (_, v) in &filters {
        data_query = data_query.bind(*v);
    }
    let rows = data_query.bind(per_page).bind(offset).fetch_all(&state.db).await?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "per_page": per_page,
    })))
}

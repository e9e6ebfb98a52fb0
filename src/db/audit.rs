use chrono::Utc;

use crate::auth::jwt::Claims;
use crate::db::{ts, DbPool};

/// Fire-and-forget: write an audit log entry for an admin action.
/// Spawns a background task so the caller is never blocked.
pub fn record(
    db: &DbPool,
    actor: &Claims,
    ip: &str,
    action: &'static str,
    resource: &'static str,
    resource_id: Option<&str>,
    detail: Option<String>,
) {
    record_raw(
        db.clone(),
        actor.sub.clone(),
        actor.username.clone(),
        action,
        resource,
        resource_id.map(str::to_string),
        detail,
        ip.to_string(),
    );
}

/// Variant for events without a session (sign-in attempts, public share access).
#[allow(clippy::too_many_arguments)]
pub fn record_raw(
    db: DbPool,
    user_id: String,
    username: String,
    action: &'static str,
    resource: &'static str,
    resource_id: Option<String>,
    detail: Option<String>,
    ip: String,
) {
    let now = ts(Utc::now());

    tokio::spawn(async move {
        let result = sqlx::query(
            "INSERT INTO audit_log (time, user_id, username, action, resource, resource_id, detail, ip)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&now)
        .bind(&user_id)
        .bind(&username)
        .bind(action)
        .bind(resource)
        .bind(resource_id.as_deref())
        .bind(detail.as_deref())
        .bind(&ip)
        .execute(&db)
        .await;

        if let Err(e) = result {
            tracing::warn!("Audit write failed ({} {}): {}", action, resource, e);
        }
    });
}

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::Config;

pub mod audit;
pub mod models;
pub mod share_sweeper;

pub type DbPool = SqlitePool;

/// PIN given to the seeded super admin on an empty database.
pub const DEFAULT_ADMIN_PIN: &str = "123456";

/// Disposition every fresh database starts with; it cannot be deleted.
pub const DEFAULT_DISPOSITION: &str = "Pending Review";

pub async fn init(cfg: &Config) -> Result<DbPool> {
    let db_url = format!("sqlite://{}?mode=rwc", cfg.database.path);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(20)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::from_str(&db_url)?
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal),
        )
        .await?;

    migrate(&pool).await?;

    tracing::info!("Database connected: {}", cfg.database.path);
    Ok(pool)
}

pub async fn migrate(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./src/db/migrations").run(pool).await?;
    Ok(())
}

/// Create the initial super admin if no admin users exist yet.
pub async fn seed_admin(pool: &DbPool, cfg: &Config) -> Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin_users")
        .fetch_one(pool)
        .await?;

    if count.0 == 0 {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let pin_hash = crate::auth::pin::hash(DEFAULT_ADMIN_PIN)?;

        sqlx::query(
            "INSERT INTO admin_users (id, username, email, pin_hash, role, is_active, created_at, updated_at)
             VALUES (?, 'admin', ?, ?, 'super_admin', 1, ?, ?)"
        )
        .bind(&id)
        .bind(&cfg.auth.initial_admin_email)
        .bind(&pin_hash)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        tracing::warn!(
            "Created default admin user (username: admin, PIN: {}, email: {}). \
             Change the PIN immediately in production!",
            DEFAULT_ADMIN_PIN,
            cfg.auth.initial_admin_email
        );
    }

    Ok(())
}

/// Make sure a protected default disposition exists. An existing default
/// counts even after it has been renamed.
pub async fn seed_defaults(pool: &DbPool) -> Result<()> {
    let (defaults,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dispositions WHERE is_default = 1")
        .fetch_one(pool)
        .await?;
    if defaults > 0 {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO dispositions (id, name, description, is_default, is_active, sort_order, created_at, updated_at)
         VALUES (?, ?, 'Awaiting review by clinic staff', 1, 1, 0, ?, ?)
         ON CONFLICT(name) DO UPDATE SET is_default = 1, is_active = 1, updated_at = excluded.updated_at"
    )
    .bind(Uuid::new_v4().to_string())
    .bind(DEFAULT_DISPOSITION)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Seeded default disposition '{}'", DEFAULT_DISPOSITION);
    Ok(())
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

/// Fixed-width UTC timestamp for columns compared in SQL (expiry, locks).
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

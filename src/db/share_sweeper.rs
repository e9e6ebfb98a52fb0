//! Background cleanup of expired attachment shares.
//!
//! Expired shares already answer 410 on access; the sweeper only keeps the
//! table from growing without bound.
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::db::DbPool;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

pub fn spawn(db: DbPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match purge_expired(&db, Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("ShareSweeper: removed {} expired shares", n),
                Err(e) => tracing::warn!("ShareSweeper: purge failed: {}", e),
            }
        }
    })
}

pub async fn purge_expired(db: &DbPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM temporary_shares WHERE expires_at <= ?")
        .bind(crate::db::ts(now))
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

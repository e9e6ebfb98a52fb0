use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use clinic_registry::{api, config, db, mailer::Mailer, metrics::ApiMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_registry=info".parse()?)
        )
        .init();

    info!("Starting clinic registry v{}", env!("CARGO_PKG_VERSION"));

    let cfg = config::load()?;
    info!("Configuration loaded");

    let db_pool = db::init(&cfg).await?;
    info!("Database initialized");

    // First start: super admin and the protected default disposition
    db::seed_admin(&db_pool, &cfg).await?;
    db::seed_defaults(&db_pool).await?;

    let mailer = Mailer::from_config(&cfg.email)?;
    let metrics = Arc::new(ApiMetrics::default());

    let _sweeper = db::share_sweeper::spawn(db_pool.clone());

    api::serve(cfg, db_pool, mailer, metrics).await
}

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::secret_box::SecretBox;
use crate::auth::two_factor::TwoFactorPolicy;
use crate::config::{Config, ShareConfig};
use crate::db::DbPool;
use crate::mailer::Mailer;
use crate::metrics::ApiMetrics;

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod validators;

pub struct AppState {
    pub db: DbPool,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub two_factor: TwoFactorPolicy,
    /// Seals TOTP secrets at rest.
    pub secret_box: SecretBox,
    pub mailer: Mailer,
    pub metrics: Arc<ApiMetrics>,
    pub shares: ShareConfig,
    pub public_base_url: String,
    /// Login failure tracking: ip → (failure_count, window_start)
    pub login_attempts: DashMap<String, (u32, Instant)>,
}

impl AppState {
    pub fn from_config(cfg: &Config, db: DbPool, mailer: Mailer, metrics: Arc<ApiMetrics>) -> Result<Self> {
        Ok(Self {
            db,
            jwt_secret: cfg.auth.jwt_secret.clone(),
            jwt_expiry_hours: cfg.auth.jwt_expiry_hours,
            two_factor: TwoFactorPolicy {
                code_ttl: chrono::Duration::seconds(cfg.auth.code_ttl_seconds),
                max_failed_attempts: cfg.auth.max_failed_attempts,
                lockout: chrono::Duration::minutes(cfg.auth.lockout_minutes),
            },
            secret_box: SecretBox::new(cfg.auth.totp_key_bytes()?),
            mailer,
            metrics,
            shares: cfg.shares.clone(),
            public_base_url: cfg.api.public_base_url.trim_end_matches('/').to_string(),
            login_attempts: DashMap::new(),
        })
    }
}

pub async fn serve(cfg: Config, db: DbPool, mailer: Mailer, metrics: Arc<ApiMetrics>) -> Result<()> {
    let bind_addr = format!("{}:{}", cfg.api.bind, cfg.api.port);
    let state = Arc::new(AppState::from_config(&cfg, db, mailer, metrics)?);
    let cors = build_cors_layer(&cfg.api.cors_allowed_origins);
    let app = build_app(state, cors);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Clinic API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("No valid CORS origins configured; CORS will block all cross-origin requests");
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_app(state: Arc<AppState>, cors: CorsLayer) -> Router {
    // Attachments arrive base64-encoded inside JSON.
    let body_limit = state.shares.max_attachment_bytes / 3 * 4 + 64 * 1024;
    Router::new()
        .merge(router::routes(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

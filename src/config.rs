use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub shares: ShareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins. Defaults to localhost dev ports.
    /// Set CLINIC__API__CORS_ALLOWED_ORIGINS in production.
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
    /// Prefix used when building share links handed back to the frontend.
    #[serde(default)]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_hours: u64,
    /// Base64 of 32 raw bytes; encrypts TOTP secrets at rest.
    pub totp_encryption_key: String,
    #[serde(default = "default_code_ttl_seconds")]
    pub code_ttl_seconds: i64,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    /// Email of the seeded super admin; 2FA codes for it go here.
    #[serde(default = "default_initial_admin_email")]
    pub initial_admin_email: String,
}

/// HTTP email API settings. When `api_base_url` is empty, codes go to the
/// in-process outbox and are written to the log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_email_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareConfig {
    #[serde(default = "default_share_ttl_hours")]
    pub default_ttl_hours: i64,
    #[serde(default = "default_share_max_ttl_hours")]
    pub max_ttl_hours: i64,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: default_share_ttl_hours(),
            max_ttl_hours: default_share_max_ttl_hours(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0".to_string() }
fn default_api_port() -> u16 { 8001 }
fn default_db_path() -> String { "./clinic-registry.db".to_string() }
fn default_jwt_expiry() -> u64 { 12 }
fn default_code_ttl_seconds() -> i64 { 180 }
fn default_max_failed_attempts() -> u32 { 5 }
fn default_lockout_minutes() -> i64 { 15 }
fn default_initial_admin_email() -> String { "admin@localhost".to_string() }
fn default_sender() -> String { "no-reply@localhost".to_string() }
fn default_email_timeout_ms() -> u64 { 10_000 }
fn default_share_ttl_hours() -> i64 { 24 }
fn default_share_max_ttl_hours() -> i64 { 168 }
fn default_max_attachment_bytes() -> usize { 10 * 1024 * 1024 }
fn default_cors_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

impl AuthConfig {
    /// Decode the TOTP encryption key into raw key bytes.
    pub fn totp_key_bytes(&self) -> Result<[u8; 32]> {
        let raw = STANDARD
            .decode(self.totp_encryption_key.trim())
            .map_err(|e| anyhow::anyhow!("TOTP encryption key is not valid base64: {}", e))?;
        raw.try_into().map_err(|v: Vec<u8>| {
            anyhow::anyhow!("TOTP encryption key must be 32 bytes (got {})", v.len())
        })
    }
}

pub fn validate(cfg: &Config) -> Result<()> {
    // Security: Reject default JWT secret
    if cfg.auth.jwt_secret == DEFAULT_JWT_SECRET {
        anyhow::bail!(
            "SECURITY ERROR: JWT secret must be changed from default value '{}'. \
            Set CLINIC__AUTH__JWT_SECRET environment variable with a strong random value.",
            DEFAULT_JWT_SECRET
        );
    }

    if cfg.auth.jwt_secret.len() < 32 {
        anyhow::bail!(
            "CONFIG ERROR: JWT secret must be at least 32 characters (current: {})",
            cfg.auth.jwt_secret.len()
        );
    }

    cfg.auth
        .totp_key_bytes()
        .map_err(|e| anyhow::anyhow!("CONFIG ERROR: {}. Set CLINIC__AUTH__TOTP_ENCRYPTION_KEY", e))?;

    if cfg.auth.code_ttl_seconds <= 0 {
        anyhow::bail!("CONFIG ERROR: auth.code_ttl_seconds must be positive");
    }

    if cfg.auth.max_failed_attempts == 0 {
        anyhow::bail!("CONFIG ERROR: auth.max_failed_attempts must be at least 1");
    }

    if cfg.shares.default_ttl_hours < 1 || cfg.shares.default_ttl_hours > cfg.shares.max_ttl_hours {
        anyhow::bail!(
            "CONFIG ERROR: shares.default_ttl_hours must be between 1 and {}",
            cfg.shares.max_ttl_hours
        );
    }

    if let Some(parent) = std::path::Path::new(&cfg.database.path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            anyhow::bail!(
                "CONFIG ERROR: Database directory does not exist: {}",
                parent.display()
            );
        }
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}

pub fn load() -> Result<Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("CLINIC")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("api.cors_allowed_origins")
                .try_parsing(true),
        )
        .set_default("api.bind", "0.0.0.0")?
        .set_default("api.port", 8001)?
        .set_default("database.path", "./clinic-registry.db")?
        .set_default("auth.jwt_secret", DEFAULT_JWT_SECRET)?
        .set_default("auth.jwt_expiry_hours", 12)?
        .set_default("auth.totp_encryption_key", "")?
        .build()?
        .try_deserialize()?;

    validate(&cfg)?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            api: ApiConfig {
                port: 8001,
                bind: "127.0.0.1".to_string(),
                cors_allowed_origins: vec![],
                public_base_url: String::new(),
            },
            database: DatabaseConfig { path: "clinic.db".to_string() },
            auth: AuthConfig {
                jwt_secret: "a-sufficiently-long-secret-for-config-tests".to_string(),
                jwt_expiry_hours: 1,
                totp_encryption_key: STANDARD.encode([7u8; 32]),
                code_ttl_seconds: 180,
                max_failed_attempts: 5,
                lockout_minutes: 15,
                initial_admin_email: "admin@clinic.test".to_string(),
            },
            email: EmailConfig::default(),
            shares: ShareConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&sample()).is_ok());
    }

    #[test]
    fn test_default_jwt_secret_rejected() {
        let mut cfg = sample();
        cfg.auth.jwt_secret = DEFAULT_JWT_SECRET.to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut cfg = sample();
        cfg.auth.jwt_secret = "short".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_totp_key_must_be_32_bytes() {
        let mut cfg = sample();
        cfg.auth.totp_encryption_key = STANDARD.encode([1u8; 16]);
        assert!(validate(&cfg).is_err());

        cfg.auth.totp_encryption_key = "not base64 !!".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_share_ttl_bounds_checked() {
        let mut cfg = sample();
        cfg.shares.default_ttl_hours = 500;
        assert!(validate(&cfg).is_err());
    }
}

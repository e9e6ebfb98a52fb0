use serde::{Deserialize, Serialize};

use crate::auth::two_factor::EmailCodeState;
use crate::db::{parse_ts, ts};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub role: String,
    pub is_active: bool,
    pub two_factor_method: String,
    #[serde(skip_serializing)]
    pub email_code_hash: Option<String>,
    #[serde(skip_serializing)]
    pub email_code_expires_at: Option<String>,
    #[serde(skip_serializing)]
    pub failed_attempts: i64,
    pub locked_until: Option<String>,
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    #[serde(skip_serializing)]
    pub totp_last_step: Option<i64>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const SELECT_ADMIN_USER: &str =
    "SELECT id, username, email, pin_hash, role, is_active, two_factor_method,
            email_code_hash, email_code_expires_at, failed_attempts, locked_until,
            totp_secret, totp_enabled, totp_last_step, last_login_at, created_at, updated_at
     FROM admin_users";

pub const METHOD_EMAIL: &str = "email";
pub const METHOD_TOTP: &str = "totp";

impl AdminUser {
    pub fn code_state(&self) -> EmailCodeState {
        EmailCodeState {
            code_hash: self.email_code_hash.clone(),
            expires_at: self.email_code_expires_at.as_deref().and_then(parse_ts),
            failed_attempts: self.failed_attempts.max(0) as u32,
            locked_until: self.locked_until.as_deref().and_then(parse_ts),
        }
    }

    pub fn uses_totp(&self) -> bool {
        self.two_factor_method == METHOD_TOTP && self.totp_enabled
    }
}

/// Column values for persisting an [`EmailCodeState`].
pub struct CodeStateColumns {
    pub code_hash: Option<String>,
    pub expires_at: Option<String>,
    pub failed_attempts: i64,
    pub locked_until: Option<String>,
}

impl From<&EmailCodeState> for CodeStateColumns {
    fn from(state: &EmailCodeState) -> Self {
        Self {
            code_hash: state.code_hash.clone(),
            expires_at: state.expires_at.map(ts),
            failed_attempts: i64::from(state.failed_attempts),
            locked_until: state.locked_until.map(ts),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminUserRequest {
    pub username: String,
    pub email: String,
    pub pin: String,
    pub role: String, // super_admin, admin
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminUserRequest {
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPinRequest {
    pub pin: String,
}

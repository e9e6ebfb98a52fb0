use axum::{extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::api::extract::{ApiJson, ClientIp};
use crate::api::AppState;
use crate::auth::jwt::{self, Claims, CHALLENGE_TTL_SECS, SCOPE_TWO_FACTOR};
use crate::auth::two_factor::{mask_email, CodeStatus, EmailCodeState, VerifyOutcome};
use crate::auth::{backup_codes, pin, totp};
use crate::db::{audit, parse_ts, ts};
use crate::db::models::admin_user::{AdminUser, CodeStateColumns, SELECT_ADMIN_USER};
use crate::error::{AppError, AppResult};
use crate::metrics::ApiMetrics;

/// Failed sign-ins allowed per client IP inside one window.
pub const MAX_LOGIN_FAILURES: u32 = 10;
pub const LOGIN_WINDOW: std::time::Duration = std::time::Duration::from_secs(15 * 60);
/// Minimum gap between two emailed codes.
pub const RESEND_COOLDOWN_SECS: i64 = 30;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    pin: String,
}

#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    challenge_token: String,
    code: String,
}

#[derive(Deserialize)]
pub struct ResendRequest {
    challenge_token: String,
}

// ── shared helpers ────────────────────────────────────────────────────────────

pub async fn load_user(state: &AppState, id: &str) -> AppResult<Option<AdminUser>> {
    let sql = format!("{} WHERE id = ?", SELECT_ADMIN_USER);
    Ok(sqlx::query_as::<_, AdminUser>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?)
}

pub async fn save_code_state(state: &AppState, user_id: &str, code_state: &EmailCodeState) -> AppResult<()> {
    let cols = CodeStateColumns::from(code_state);
    sqlx::query(
        "UPDATE admin_users
         SET email_code_hash = ?, email_code_expires_at = ?, failed_attempts = ?, locked_until = ?
         WHERE id = ?"
    )
    .bind(&cols.code_hash)
    .bind(&cols.expires_at)
    .bind(cols.failed_attempts)
    .bind(&cols.locked_until)
    .bind(user_id)
    .execute(&state.db)
    .await?;
    Ok(())
}

/// Store a freshly issued code. The failure counter and lock are left alone.
async fn store_code(state: &AppState, user_id: &str, issued: &EmailCodeState) -> AppResult<()> {
    let cols = CodeStateColumns::from(issued);
    sqlx::query("UPDATE admin_users SET email_code_hash = ?, email_code_expires_at = ? WHERE id = ?")
        .bind(&cols.code_hash)
        .bind(&cols.expires_at)
        .bind(user_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

fn check_throttle(state: &AppState, ip: &str) -> AppResult<()> {
    if let Some(entry) = state.login_attempts.get(ip) {
        let (count, since) = *entry;
        if since.elapsed() < LOGIN_WINDOW && count >= MAX_LOGIN_FAILURES {
            tracing::warn!("Sign-in throttled for {}", ip);
            return Err(AppError::TooManyRequests);
        }
    }
    Ok(())
}

fn note_ip_failure(state: &AppState, ip: &str) {
    let mut entry = state
        .login_attempts
        .entry(ip.to_string())
        .or_insert((0, Instant::now()));
    if entry.1.elapsed() >= LOGIN_WINDOW {
        *entry = (0, Instant::now());
    }
    entry.0 += 1;
}

/// Resolve a challenge token to an active admin.
async fn challenge_user(state: &AppState, token: &str) -> AppResult<(Claims, AdminUser)> {
    let claims = jwt::verify_scoped(token, &state.jwt_secret, SCOPE_TWO_FACTOR)
        .map_err(|_| AppError::AuthFailed)?;
    let user = load_user(state, &claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::AuthFailed)?;
    Ok((claims, user))
}

/// One guess reserved against an account's failure budget.
pub struct ClaimedAttempt {
    /// Failure count including this guess.
    pub attempts: u32,
    code_hash: Option<String>,
    expires_at: Option<String>,
}

impl ClaimedAttempt {
    /// Email code state as it stood before this guess was counted.
    fn code_state(&self) -> EmailCodeState {
        EmailCodeState {
            code_hash: self.code_hash.clone(),
            expires_at: self.expires_at.as_deref().and_then(parse_ts),
            failed_attempts: self.attempts.saturating_sub(1),
            locked_until: None,
        }
    }
}

/// Count a guess before any secret is compared. The lock check and the
/// increment are one statement, so parallel requests cannot test more
/// secrets than `max_failed_attempts`. `None` means the account is locked.
pub async fn claim_attempt(
    state: &AppState,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<ClaimedAttempt>> {
    let now = ts(now);
    let row: Option<(i64, Option<String>, Option<String>)> = sqlx::query_as(
        "UPDATE admin_users
         SET failed_attempts = CASE WHEN locked_until <= ? THEN 1 ELSE failed_attempts + 1 END,
             locked_until = CASE WHEN locked_until <= ? THEN NULL ELSE locked_until END
         WHERE id = ?
           AND (locked_until IS NULL OR locked_until <= ?)
           AND (locked_until IS NOT NULL OR failed_attempts < ?)
         RETURNING failed_attempts, email_code_hash, email_code_expires_at"
    )
    .bind(&now)
    .bind(&now)
    .bind(user_id)
    .bind(&now)
    .bind(i64::from(state.two_factor.max_failed_attempts))
    .fetch_optional(&state.db)
    .await?;

    Ok(row.map(|(attempts, code_hash, expires_at)| ClaimedAttempt {
        attempts: attempts.max(0) as u32,
        code_hash,
        expires_at,
    }))
}

/// Hand back a claimed guess that was correct or never compared.
pub async fn release_attempt(state: &AppState, user_id: &str) -> AppResult<()> {
    sqlx::query(
        "UPDATE admin_users SET failed_attempts = MAX(failed_attempts - 1, 0)
         WHERE id = ? AND locked_until IS NULL"
    )
    .bind(user_id)
    .execute(&state.db)
    .await?;
    Ok(())
}

/// The claimed guess was wrong. Locks the account when it used up the last
/// attempt, then picks the error to return.
pub async fn reject_attempt(
    state: &AppState,
    user: &AdminUser,
    ip: &str,
    claimed: &ClaimedAttempt,
    now: DateTime<Utc>,
    reason: &'static str,
) -> AppError {
    let locked = state.two_factor.locks_at(claimed.attempts);
    if locked {
        let lock = EmailCodeState {
            locked_until: Some(now + state.two_factor.lockout),
            ..EmailCodeState::default()
        };
        if let Err(e) = save_code_state(state, &user.id, &lock).await {
            return e;
        }
    }

    ApiMetrics::inc(&state.metrics.logins_failed);
    note_ip_failure(state, ip);
    audit::record_raw(
        state.db.clone(),
        user.id.clone(),
        user.username.clone(),
        "login_failed",
        "admin_session",
        None,
        Some(reason.to_string()),
        ip.to_string(),
    );
    if locked {
        ApiMetrics::inc(&state.metrics.lockouts);
        tracing::warn!("Admin '{}' locked after repeated failures", user.username);
        AppError::Locked
    } else {
        AppError::AuthFailed
    }
}

async fn send_code(state: &AppState, user: &AdminUser, code: &str) -> AppResult<()> {
    let ttl_minutes = (state.two_factor.code_ttl.num_seconds() + 59) / 60;
    state
        .mailer
        .send_login_code(&user.email, code, ttl_minutes)
        .await
        .map_err(|e| {
            tracing::warn!("Failed to send verification code to '{}': {}", user.username, e);
            AppError::Internal("Failed to send verification code".to_string())
        })?;
    ApiMetrics::inc(&state.metrics.codes_sent);
    Ok(())
}

/// Second factor passed: reset counters and hand out a session token.
async fn complete_login(state: &AppState, user: &AdminUser, ip: &str, factor: &'static str) -> AppResult<Json<Value>> {
    let now = Utc::now().to_rfc3339();
    save_code_state(state, &user.id, &EmailCodeState::cleared()).await?;
    sqlx::query("UPDATE admin_users SET last_login_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let token = jwt::generate(
        &user.id,
        &user.username,
        &user.role,
        &state.jwt_secret,
        state.jwt_expiry_hours,
    )?;

    state.login_attempts.remove(ip);
    ApiMetrics::inc(&state.metrics.logins_succeeded);
    audit::record_raw(
        state.db.clone(),
        user.id.clone(),
        user.username.clone(),
        "login",
        "admin_session",
        None,
        Some(format!("factor={}", factor)),
        ip.to_string(),
    );

    Ok(Json(json!({
        "token": token,
        "expires_in": state.jwt_expiry_hours * 3600,
        "role": user.role,
        "username": user.username,
    })))
}

// ── handlers ──────────────────────────────────────────────────────────────────

/// Step one: username + PIN. Answers with a challenge token for step two.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<Value>> {
    check_throttle(&state, &ip)?;

    let sql = format!("{} WHERE username = ?", SELECT_ADMIN_USER);
    let user: Option<AdminUser> = sqlx::query_as(&sql)
        .bind(req.username.trim())
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user.filter(|u| u.is_active) else {
        ApiMetrics::inc(&state.metrics.logins_failed);
        note_ip_failure(&state, &ip);
        return Err(AppError::AuthFailed);
    };

    let now = Utc::now();
    let Some(claimed) = claim_attempt(&state, &user.id, now).await? else {
        return Err(AppError::Locked);
    };
    if !pin::verify(&req.pin, &user.pin_hash) {
        return Err(reject_attempt(&state, &user, &ip, &claimed, now, "wrong PIN").await);
    }
    release_attempt(&state, &user.id).await?;

    let challenge_token = jwt::generate_challenge(&user.id, &user.username, &user.role, &state.jwt_secret)?;

    if user.uses_totp() {
        return Ok(Json(json!({
            "two_factor_required": true,
            "method": "totp",
            "challenge_token": challenge_token,
            "expires_in": CHALLENGE_TTL_SECS,
        })));
    }

    let (code, next) = claimed.code_state().issue(&state.two_factor, now);
    store_code(&state, &user.id, &next).await?;
    send_code(&state, &user, &code).await?;

    Ok(Json(json!({
        "two_factor_required": true,
        "method": "email",
        "challenge_token": challenge_token,
        "expires_in": state.two_factor.code_ttl.num_seconds(),
        "email_hint": mask_email(&user.email),
    })))
}

/// Step two for email accounts.
pub async fn verify_email_code(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<VerifyCodeRequest>,
) -> AppResult<Json<Value>> {
    check_throttle(&state, &ip)?;
    let (_, user) = challenge_user(&state, &req.challenge_token).await?;
    if user.uses_totp() {
        return Err(AppError::Validation(
            "This account uses an authenticator app; verify with /api/admin/2fa/totp/verify".to_string(),
        ));
    }

    let now = Utc::now();
    let Some(claimed) = claim_attempt(&state, &user.id, now).await? else {
        return Err(AppError::Locked);
    };
    let (outcome, _) = claimed.code_state().verify(&req.code, &state.two_factor, now);

    match outcome {
        VerifyOutcome::Verified => complete_login(&state, &user, &ip, "email_code").await,
        VerifyOutcome::Mismatch { .. } => {
            Err(reject_attempt(&state, &user, &ip, &claimed, now, "wrong email code").await)
        }
        VerifyOutcome::Locked => Err(AppError::Locked),
        VerifyOutcome::NoCode => {
            release_attempt(&state, &user.id).await?;
            Err(AppError::Validation(
                "No verification code pending. Request a new code".to_string(),
            ))
        }
        VerifyOutcome::Expired => {
            release_attempt(&state, &user.id).await?;
            if let Some(ref stale) = claimed.code_hash {
                sqlx::query(
                    "UPDATE admin_users SET email_code_hash = NULL, email_code_expires_at = NULL
                     WHERE id = ? AND email_code_hash = ?"
                )
                .bind(&user.id)
                .bind(stale)
                .execute(&state.db)
                .await?;
            }
            Err(AppError::Validation(
                "Verification code expired. Request a new code".to_string(),
            ))
        }
    }
}

/// Replace the pending code. Refused while locked and within
/// `RESEND_COOLDOWN_SECS` of the previous code.
pub async fn resend_code(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<ResendRequest>,
) -> AppResult<Json<Value>> {
    check_throttle(&state, &ip)?;
    let (_, user) = challenge_user(&state, &req.challenge_token).await?;
    if user.uses_totp() {
        return Err(AppError::Validation(
            "This account uses an authenticator app".to_string(),
        ));
    }

    let now = Utc::now();
    let current = user.code_state();
    match current.status(now) {
        CodeStatus::Locked => return Err(AppError::Locked),
        CodeStatus::CodeSent => {
            let issued_at = current.expires_at.map(|exp| exp - state.two_factor.code_ttl);
            if matches!(issued_at, Some(at) if now - at < Duration::seconds(RESEND_COOLDOWN_SECS)) {
                return Err(AppError::TooManyRequests);
            }
        }
        CodeStatus::NoCode | CodeStatus::Expired => {}
    }

    // Same checks again inside the write, so two racing resends send one code.
    let (code, next) = current.issue(&state.two_factor, now);
    let cols = CodeStateColumns::from(&next);
    let newest_replaceable = ts(now - Duration::seconds(RESEND_COOLDOWN_SECS) + state.two_factor.code_ttl);
    let replaced = sqlx::query(
        "UPDATE admin_users SET email_code_hash = ?, email_code_expires_at = ?
         WHERE id = ?
           AND (locked_until IS NULL OR locked_until <= ?)
           AND (email_code_hash IS NULL OR email_code_expires_at <= ?)"
    )
    .bind(&cols.code_hash)
    .bind(&cols.expires_at)
    .bind(&user.id)
    .bind(ts(now))
    .bind(&newest_replaceable)
    .execute(&state.db)
    .await?;
    if replaced.rows_affected() == 0 {
        return Err(AppError::TooManyRequests);
    }
    send_code(&state, &user, &code).await?;

    Ok(Json(json!({
        "success": true,
        "expires_in": state.two_factor.code_ttl.num_seconds(),
        "email_hint": mask_email(&user.email),
    })))
}

/// Step two for legacy authenticator-app accounts. Accepts a TOTP code or
/// an unused backup code.
pub async fn verify_totp(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<VerifyCodeRequest>,
) -> AppResult<Json<Value>> {
    check_throttle(&state, &ip)?;
    let (_, user) = challenge_user(&state, &req.challenge_token).await?;
    if !user.uses_totp() {
        return Err(AppError::Validation(
            "Authenticator app is not enabled for this account".to_string(),
        ));
    }

    let now = Utc::now();
    let Some(claimed) = claim_attempt(&state, &user.id, now).await? else {
        return Err(AppError::Locked);
    };

    let code = req.code.trim();
    if totp::looks_like_totp(code) {
        let sealed = user
            .totp_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("TOTP enabled without a secret".to_string()))?;
        let secret = state
            .secret_box
            .open(sealed)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        return match totp::verify(&secret, code, now.timestamp() as u64, user.totp_last_step)? {
            totp::TotpCheck::Accepted { step } => {
                // A concurrent request may have spent this step already.
                let fresh = sqlx::query(
                    "UPDATE admin_users SET totp_last_step = ?
                     WHERE id = ? AND (totp_last_step IS NULL OR totp_last_step < ?)"
                )
                .bind(step)
                .bind(&user.id)
                .bind(step)
                .execute(&state.db)
                .await?;
                if fresh.rows_affected() == 1 {
                    complete_login(&state, &user, &ip, "totp").await
                } else {
                    Err(reject_attempt(&state, &user, &ip, &claimed, now, "replayed TOTP code").await)
                }
            }
            totp::TotpCheck::Replayed => {
                Err(reject_attempt(&state, &user, &ip, &claimed, now, "replayed TOTP code").await)
            }
            totp::TotpCheck::Invalid => {
                Err(reject_attempt(&state, &user, &ip, &claimed, now, "wrong TOTP code").await)
            }
        };
    }

    if backup_codes::looks_like_backup_code(code) && consume_backup_code(&state, &user.id, code).await? {
        tracing::info!("Admin '{}' signed in with a backup code", user.username);
        return complete_login(&state, &user, &ip, "backup_code").await;
    }

    Err(reject_attempt(&state, &user, &ip, &claimed, now, "wrong backup code").await)
}

/// Mark a backup code used. The `used_at IS NULL` guard keeps it single use
/// even under concurrent requests.
async fn consume_backup_code(state: &AppState, user_id: &str, code: &str) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE admin_backup_codes SET used_at = ?
         WHERE user_id = ? AND code_hash = ? AND used_at IS NULL"
    )
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(backup_codes::hash(code))
    .execute(&state.db)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn logout() -> AppResult<Json<Value>> {
    // JWT is stateless; client just discards the token.
    Ok(Json(json!({"success": true})))
}

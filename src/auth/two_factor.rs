//! Email one-time code lifecycle for the second login factor.
//!
//! The state lives in four columns of `admin_users` (code hash, code expiry,
//! failure counter, lock deadline). Everything here is pure: callers load an
//! [`EmailCodeState`], ask for a transition at a given instant, and persist
//! the returned state.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const CODE_DIGITS: usize = 6;

/// Tunables for code expiry and lockout.
#[derive(Debug, Clone, Copy)]
pub struct TwoFactorPolicy {
    pub code_ttl: Duration,
    pub max_failed_attempts: u32,
    pub lockout: Duration,
}

impl TwoFactorPolicy {
    /// Whether the `attempts`-th consecutive failure locks the account.
    pub fn locks_at(&self, attempts: u32) -> bool {
        attempts >= self.max_failed_attempts
    }
}

impl Default for TwoFactorPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(3),
            max_failed_attempts: 5,
            lockout: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailCodeState {
    pub code_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    NoCode,
    CodeSent,
    Expired,
    Locked,
}

impl CodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeStatus::NoCode => "no_code",
            CodeStatus::CodeSent => "code_sent",
            CodeStatus::Expired => "expired",
            CodeStatus::Locked => "locked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    /// Wrong code. `locked` is set when this failure hit the threshold.
    Mismatch { locked: bool },
    Expired,
    NoCode,
    Locked,
}

/// Six random decimal digits, leading zeros kept.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", n, width = CODE_DIGITS)
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

pub fn code_matches(code: &str, stored_hash: &str) -> bool {
    let candidate = hash_code(code);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

impl EmailCodeState {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> CodeStatus {
        if self.is_locked(now) {
            return CodeStatus::Locked;
        }
        match (&self.code_hash, self.expires_at) {
            (Some(_), Some(exp)) if now < exp => CodeStatus::CodeSent,
            (Some(_), _) => CodeStatus::Expired,
            (None, _) => CodeStatus::NoCode,
        }
    }

    /// Replace any pending code with a fresh one. The failure counter is
    /// kept so that resending cannot be used to reset it. An expired lock is
    /// cleared.
    pub fn issue(&self, policy: &TwoFactorPolicy, now: DateTime<Utc>) -> (String, EmailCodeState) {
        let code = generate_code();
        let next = EmailCodeState {
            code_hash: Some(hash_code(&code)),
            expires_at: Some(now + policy.code_ttl),
            failed_attempts: self.active_failures(now),
            locked_until: self.locked_until.filter(|until| *until > now),
        };
        (code, next)
    }

    /// Count one failed attempt (wrong PIN, code, TOTP or backup code).
    pub fn record_failure(&self, policy: &TwoFactorPolicy, now: DateTime<Utc>) -> EmailCodeState {
        let attempts = self.active_failures(now) + 1;
        if policy.locks_at(attempts) {
            EmailCodeState {
                code_hash: None,
                expires_at: None,
                failed_attempts: 0,
                locked_until: Some(now + policy.lockout),
            }
        } else {
            EmailCodeState {
                failed_attempts: attempts,
                locked_until: None,
                ..self.clone()
            }
        }
    }

    /// State after a successful second factor.
    pub fn cleared() -> EmailCodeState {
        EmailCodeState::default()
    }

    pub fn verify(
        &self,
        code: &str,
        policy: &TwoFactorPolicy,
        now: DateTime<Utc>,
    ) -> (VerifyOutcome, EmailCodeState) {
        match self.status(now) {
            CodeStatus::Locked => (VerifyOutcome::Locked, self.clone()),
            CodeStatus::NoCode => (VerifyOutcome::NoCode, self.clone()),
            CodeStatus::Expired => (
                VerifyOutcome::Expired,
                EmailCodeState {
                    code_hash: None,
                    expires_at: None,
                    ..self.clone()
                },
            ),
            CodeStatus::CodeSent => {
                let stored = self.code_hash.as_deref().unwrap_or_default();
                if code_matches(code, stored) {
                    (VerifyOutcome::Verified, EmailCodeState::cleared())
                } else {
                    let next = self.record_failure(policy, now);
                    let locked = next.is_locked(now);
                    (VerifyOutcome::Mismatch { locked }, next)
                }
            }
        }
    }

    // A lock that has run out leaves the counter at zero.
    fn active_failures(&self, now: DateTime<Utc>) -> u32 {
        match self.locked_until {
            Some(until) if until <= now => 0,
            _ => self.failed_attempts,
        }
    }
}

/// `jane.doe@clinic.org` -> `j***@clinic.org`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_is_not_plaintext_and_matches() {
        let h = hash_code("012345");
        assert_ne!(h, "012345");
        assert_eq!(h.len(), 64);
        assert!(code_matches("012345", &h));
        assert!(code_matches(" 012345 ", &h));
        assert!(!code_matches("012346", &h));
    }

    #[test]
    fn test_status_transitions() {
        let policy = TwoFactorPolicy::default();
        let empty = EmailCodeState::default();
        assert_eq!(empty.status(t0()), CodeStatus::NoCode);

        let (_, sent) = empty.issue(&policy, t0());
        assert_eq!(sent.status(t0()), CodeStatus::CodeSent);
        assert_eq!(sent.status(t0() + Duration::seconds(179)), CodeStatus::CodeSent);
        // Expiry boundary is exclusive.
        assert_eq!(sent.status(t0() + Duration::seconds(180)), CodeStatus::Expired);
    }

    #[test]
    fn test_verify_correct_code_clears_state() {
        let policy = TwoFactorPolicy::default();
        let (code, sent) = EmailCodeState::default().issue(&policy, t0());
        let (outcome, next) = sent.verify(&code, &policy, t0() + Duration::seconds(30));
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert_eq!(next, EmailCodeState::cleared());
    }

    #[test]
    fn test_expired_code_is_rejected_and_cleared() {
        let policy = TwoFactorPolicy::default();
        let (code, sent) = EmailCodeState::default().issue(&policy, t0());
        let (outcome, next) = sent.verify(&code, &policy, t0() + Duration::minutes(4));
        assert_eq!(outcome, VerifyOutcome::Expired);
        assert!(next.code_hash.is_none());
        assert_eq!(next.status(t0() + Duration::minutes(4)), CodeStatus::NoCode);
    }

    #[test]
    fn test_lockout_on_exactly_max_failures() {
        let policy = TwoFactorPolicy::default();
        let (code, mut state) = EmailCodeState::default().issue(&policy, t0());
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for i in 1..policy.max_failed_attempts {
            let (outcome, next) = state.verify(wrong, &policy, t0());
            assert_eq!(outcome, VerifyOutcome::Mismatch { locked: false });
            assert_eq!(next.failed_attempts, i);
            state = next;
        }

        let (outcome, locked) = state.verify(wrong, &policy, t0());
        assert_eq!(outcome, VerifyOutcome::Mismatch { locked: true });
        assert!(locked.code_hash.is_none());
        assert_eq!(locked.status(t0()), CodeStatus::Locked);

        // Even the right code is refused while locked.
        let (outcome, _) = locked.verify(&code, &policy, t0() + Duration::minutes(1));
        assert_eq!(outcome, VerifyOutcome::Locked);
    }

    #[test]
    fn test_policy_locks_at_threshold() {
        let policy = TwoFactorPolicy::default();
        assert!(!policy.locks_at(4));
        assert!(policy.locks_at(5));
        assert!(policy.locks_at(6));
    }

    #[test]
    fn test_lock_expires_and_counter_restarts() {
        let policy = TwoFactorPolicy::default();
        let locked = EmailCodeState {
            locked_until: Some(t0()),
            failed_attempts: 0,
            ..Default::default()
        };
        let later = t0() + Duration::seconds(1);
        assert!(!locked.is_locked(later));
        let (_, reissued) = locked.issue(&policy, later);
        assert_eq!(reissued.locked_until, None);
        assert_eq!(reissued.failed_attempts, 0);
        assert_eq!(reissued.status(later), CodeStatus::CodeSent);
    }

    #[test]
    fn test_resend_keeps_failure_counter() {
        let policy = TwoFactorPolicy::default();
        let (_, sent) = EmailCodeState::default().issue(&policy, t0());
        let failed = sent.record_failure(&policy, t0()).record_failure(&policy, t0());
        let (_, resent) = failed.issue(&policy, t0());
        assert_eq!(resent.failed_attempts, 2);
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("jane.doe@clinic.org"), "j***@clinic.org");
        assert_eq!(mask_email("nobody"), "***");
    }
}

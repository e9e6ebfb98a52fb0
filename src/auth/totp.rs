//! Legacy authenticator-app codes (RFC 6238). New accounts use emailed codes;
//! this path is kept for admins who enrolled an authenticator app earlier.

use anyhow::Result;
use rand::RngCore;
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, TOTP};

pub const STEP_SECS: u64 = 30;
pub const DIGITS: usize = 6;
pub const SKEW_STEPS: i64 = 1;
pub const SECRET_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpCheck {
    /// Code matched the given time step.
    Accepted { step: i64 },
    /// Code matched a step that was already consumed.
    Replayed,
    Invalid,
}

pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_LENGTH];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

fn build(secret: &[u8]) -> Result<TOTP> {
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW_STEPS as u8, STEP_SECS, secret.to_vec())
        .map_err(|e| anyhow::anyhow!("Invalid TOTP secret: {}", e))
}

/// Base32 form shown to the user once during setup.
pub fn secret_base32(secret: &[u8]) -> Result<String> {
    Ok(build(secret)?.get_secret_base32())
}

pub fn code_at(secret: &[u8], unix_secs: u64) -> Result<String> {
    Ok(build(secret)?.generate(unix_secs))
}

pub fn looks_like_totp(code: &str) -> bool {
    code.len() == DIGITS && code.chars().all(|c| c.is_ascii_digit())
}

/// Check `code` against the current step and one step either side.
/// `last_step` is the step of the last accepted code; that step and any
/// earlier one are refused.
pub fn verify(secret: &[u8], code: &str, unix_secs: u64, last_step: Option<i64>) -> Result<TotpCheck> {
    let code = code.trim();
    if !looks_like_totp(code) {
        return Ok(TotpCheck::Invalid);
    }

    let totp = build(secret)?;
    let current = (unix_secs / STEP_SECS) as i64;

    for step in (current - SKEW_STEPS)..=(current + SKEW_STEPS) {
        if step < 0 {
            continue;
        }
        let expected = totp.generate(step as u64 * STEP_SECS);
        if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
            return Ok(match last_step {
                Some(last) if step <= last => TotpCheck::Replayed,
                _ => TotpCheck::Accepted { step },
            });
        }
    }

    Ok(TotpCheck::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seed for SHA-1.
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_vector() {
        // T = 59 -> 94287082 (8 digits); the 6-digit code is the low six.
        assert_eq!(code_at(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(code_at(RFC_SECRET, 1111111109).unwrap(), "081804");
    }

    #[test]
    fn test_accepts_adjacent_steps() {
        let now = 1_700_000_000u64;
        for offset in [-30i64, 0, 30] {
            let code = code_at(RFC_SECRET, (now as i64 + offset) as u64).unwrap();
            let check = verify(RFC_SECRET, &code, now, None).unwrap();
            assert!(matches!(check, TotpCheck::Accepted { .. }), "offset {offset}");
        }
    }

    #[test]
    fn test_rejects_two_steps_away() {
        let now = 1_700_000_000u64;
        let code = code_at(RFC_SECRET, now - 60).unwrap();
        let current = code_at(RFC_SECRET, now).unwrap();
        let previous = code_at(RFC_SECRET, now - 30).unwrap();
        if code != current && code != previous {
            assert_eq!(verify(RFC_SECRET, &code, now, None).unwrap(), TotpCheck::Invalid);
        }
    }

    #[test]
    fn test_replay_of_consumed_step_refused() {
        let now = 1_700_000_000u64;
        let code = code_at(RFC_SECRET, now).unwrap();
        let step = match verify(RFC_SECRET, &code, now, None).unwrap() {
            TotpCheck::Accepted { step } => step,
            other => panic!("expected accept, got {:?}", other),
        };
        assert_eq!(step, (now / STEP_SECS) as i64);
        assert_eq!(
            verify(RFC_SECRET, &code, now + 5, Some(step)).unwrap(),
            TotpCheck::Replayed
        );
        let next = code_at(RFC_SECRET, now + 30).unwrap();
        assert_eq!(
            verify(RFC_SECRET, &next, now + 30, Some(step)).unwrap(),
            TotpCheck::Accepted { step: step + 1 }
        );
    }

    #[test]
    fn test_malformed_codes_are_invalid() {
        assert_eq!(verify(RFC_SECRET, "12345", 59, None).unwrap(), TotpCheck::Invalid);
        assert_eq!(verify(RFC_SECRET, "abcdef", 59, None).unwrap(), TotpCheck::Invalid);
    }

    #[test]
    fn test_generated_secret_round_trips_to_base32() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LENGTH);
        let b32 = secret_base32(&secret).unwrap();
        assert_eq!(b32.len(), 32);
    }
}

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Token scope. Session tokens open the API; challenge tokens only prove the
/// PIN step passed and are accepted by the second-factor endpoints.
pub const SCOPE_SESSION: &str = "session";
pub const SCOPE_TWO_FACTOR: &str = "two_factor";

/// Lifetime of a two-factor challenge token.
pub const CHALLENGE_TTL_SECS: usize = 300;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,       // admin user id
    pub username: String,
    pub role: String,
    pub scope: String,
    pub exp: usize,
    pub iat: usize,
}

fn sign(claims: &Claims, secret: &str) -> Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn generate(user_id: &str, username: &str, role: &str, secret: &str, expiry_hours: u64) -> Result<String> {
    let now = Utc::now().timestamp() as usize;
    sign(
        &Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            scope: SCOPE_SESSION.to_string(),
            exp: now + (expiry_hours as usize * 3600),
            iat: now,
        },
        secret,
    )
}

pub fn generate_challenge(user_id: &str, username: &str, role: &str, secret: &str) -> Result<String> {
    let now = Utc::now().timestamp() as usize;
    sign(
        &Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            scope: SCOPE_TWO_FACTOR.to_string(),
            exp: now + CHALLENGE_TTL_SECS,
            iat: now,
        },
        secret,
    )
}

pub fn verify(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// Verify a token and require the given scope.
pub fn verify_scoped(token: &str, secret: &str, scope: &str) -> Result<Claims> {
    let claims = verify(token, secret)?;
    if claims.scope != scope {
        anyhow::bail!("token scope '{}' does not match '{}'", claims.scope, scope);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-for-unit-tests-only";

    #[test]
    fn test_generate_and_verify_session_token() {
        let token = generate("user-123", "nurse.kim", "admin", TEST_SECRET, 12)
            .expect("Should generate token");
        let claims = verify_scoped(&token, TEST_SECRET, SCOPE_SESSION)
            .expect("Should verify valid token");
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.username, "nurse.kim");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_challenge_token_is_not_a_session() {
        let token = generate_challenge("user-123", "nurse.kim", "admin", TEST_SECRET)
            .expect("Should generate challenge");
        assert!(verify_scoped(&token, TEST_SECRET, SCOPE_SESSION).is_err());
        let claims = verify_scoped(&token, TEST_SECRET, SCOPE_TWO_FACTOR)
            .expect("Challenge scope should verify");
        assert!(claims.exp - claims.iat == CHALLENGE_TTL_SECS);
    }

    #[test]
    fn test_verify_wrong_secret_fails() {
        let token = generate("user-123", "admin", "admin", TEST_SECRET, 1)
            .expect("Should generate token");
        assert!(verify(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_verify_malformed_token_fails() {
        assert!(verify("not.a.valid.jwt", TEST_SECRET).is_err());
        assert!(verify("", TEST_SECRET).is_err());
    }

    #[test]
    fn test_token_expiry_set_correctly() {
        let before = Utc::now().timestamp() as usize;
        let token = generate("u1", "admin", "admin", TEST_SECRET, 2)
            .expect("Should generate token");
        let after = Utc::now().timestamp() as usize;

        let claims = verify(&token, TEST_SECRET).expect("Should verify");
        assert!(claims.exp >= before + 2 * 3600);
        assert!(claims.exp <= after + 2 * 3600);
    }
}

use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 8;

/// Admin PINs are 4 to 8 ASCII digits.
pub fn validate_format(pin: &str) -> Result<(), String> {
    if pin.len() < MIN_PIN_LEN || pin.len() > MAX_PIN_LEN {
        return Err(format!(
            "PIN must be between {} and {} digits",
            MIN_PIN_LEN, MAX_PIN_LEN
        ));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err("PIN must contain digits only".to_string());
    }
    Ok(())
}

pub fn hash(pin: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("PIN hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify(pin: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_correct_pin() {
        let hash = hash("4821").expect("Should hash PIN");
        assert!(verify("4821", &hash));
        assert!(!verify("4822", &hash));
    }

    #[test]
    fn test_same_pin_hashes_differ() {
        let h1 = hash("123456").expect("Should hash");
        let h2 = hash("123456").expect("Should hash");
        assert_ne!(h1, h2, "Random salt should make hashes differ");
        assert!(h1.starts_with("$argon2"));
    }

    #[test]
    fn test_malformed_hash_returns_false() {
        assert!(!verify("1234", "plaintext-not-a-hash"));
        assert!(!verify("1234", ""));
    }

    #[test]
    fn test_pin_format() {
        assert!(validate_format("1234").is_ok());
        assert!(validate_format("12345678").is_ok());
        assert!(validate_format("123").is_err());
        assert!(validate_format("123456789").is_err());
        assert!(validate_format("12a4").is_err());
        assert!(validate_format("").is_err());
    }
}

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

pub const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

#[derive(Error, Debug, PartialEq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Malformed sealed value")]
    Malformed,
}

/// Seals short secrets (TOTP seeds) for storage in a TEXT column.
/// Layout before base64: `[12-byte nonce][ciphertext + 16-byte tag]`.
#[derive(Clone)]
pub struct SecretBox {
    key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(bytes))
    }

    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = STANDARD.decode(sealed).map_err(|_| CryptoError::Malformed)?;
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::Malformed);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let (nonce, ciphertext) = bytes.split_at(NONCE_LENGTH);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let sb = SecretBox::new([3u8; KEY_LENGTH]);
        let sealed = sb.seal(b"JBSWY3DPEHPK3PXP").expect("seal");
        assert_ne!(sealed, "JBSWY3DPEHPK3PXP");
        assert_eq!(sb.open(&sealed).expect("open"), b"JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn test_each_seal_uses_fresh_nonce() {
        let sb = SecretBox::new([3u8; KEY_LENGTH]);
        assert_ne!(sb.seal(b"same").unwrap(), sb.seal(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretBox::new([3u8; KEY_LENGTH]).seal(b"secret").unwrap();
        let other = SecretBox::new([4u8; KEY_LENGTH]);
        assert_eq!(other.open(&sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sb = SecretBox::new([3u8; KEY_LENGTH]);
        let sealed = sb.seal(b"secret").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert_eq!(sb.open(&STANDARD.encode(raw)), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_short_or_garbage_input_is_malformed() {
        let sb = SecretBox::new([3u8; KEY_LENGTH]);
        assert_eq!(sb.open("AAAA"), Err(CryptoError::Malformed));
        assert_eq!(sb.open("%%%"), Err(CryptoError::Malformed));
    }
}

use rand::Rng;
use sha2::{Digest, Sha256};

pub const CODE_COUNT: usize = 10;
const GROUP_LEN: usize = 4;
// No 0/O or 1/I/L, they get misread off paper.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Fresh set of plaintext codes, `XXXX-XXXX`.
pub fn generate() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..CODE_COUNT)
        .map(|_| {
            let mut raw = String::with_capacity(GROUP_LEN * 2 + 1);
            for i in 0..GROUP_LEN * 2 {
                if i == GROUP_LEN {
                    raw.push('-');
                }
                raw.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
            raw
        })
        .collect()
}

/// Uppercase, separators and whitespace dropped.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn looks_like_backup_code(input: &str) -> bool {
    normalize(input).len() == GROUP_LEN * 2
}

pub fn hash(code: &str) -> String {
    hex::encode(Sha256::digest(normalize(code).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_shape() {
        let codes = generate();
        assert_eq!(codes.len(), CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            assert!(looks_like_backup_code(code));
        }
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), CODE_COUNT);
    }

    #[test]
    fn test_hash_ignores_formatting() {
        assert_eq!(hash("abcd-efgh"), hash("ABCDEFGH"));
        assert_eq!(hash(" abcd efgh "), hash("ABCD-EFGH"));
        assert_ne!(hash("ABCD-EFGH"), hash("ABCD-EFGJ"));
    }

    #[test]
    fn test_totp_codes_are_not_backup_codes() {
        assert!(!looks_like_backup_code("123456"));
        assert!(looks_like_backup_code("2345-6789"));
    }
}

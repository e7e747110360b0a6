//! # Random Secret Generator
//!
//! Cryptographically random material for single-use secrets, recovery
//! codes, and TOTP shared secrets. Alphabet mapping is done by modulo:
//! for non-power-of-two alphabets this biases slightly toward lower
//! indices, which is acceptable for these secrets (they are long and
//! never compared statistically).

use rand::rngs::OsRng;
use rand::RngCore;

use super::totp::base32_encode;

/// Random string over `alphabet`, one random byte per output character
pub fn random_string(alphabet: &str, length: usize) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    debug_assert!(!chars.is_empty());

    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);

    bytes
        .iter()
        .map(|b| chars[*b as usize % chars.len()])
        .collect()
}

/// `count` independent random strings.
///
/// No uniqueness check across the returned values; collisions are
/// astronomically unlikely at the lengths used here.
pub fn random_string_array(alphabet: &str, length: usize, count: usize) -> Vec<String> {
    (0..count).map(|_| random_string(alphabet, length)).collect()
}

/// Random base32 string of `size` characters (TOTP shared secret)
pub fn random_base32(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);

    let mut encoded = base32_encode(&bytes);
    encoded.truncate(size);
    encoded
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    #[test]
    fn test_random_string_length_and_alphabet() {
        let s = random_string(ALPHABET, 120);
        assert_eq!(s.len(), 120);
        assert!(s.chars().all(|c| ALPHABET.contains(c)));
    }

    #[test]
    fn test_random_string_array_count() {
        let codes = random_string_array(ALPHABET, 10, 10);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 10);
        }
        // Not guaranteed, but at this entropy two identical codes would
        // indicate a broken RNG.
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_random_base32() {
        let secret = random_base32(32);
        assert_eq!(secret.len(), 32);
        assert!(secret
            .chars()
            .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c)));
    }

    #[test]
    fn test_two_calls_differ() {
        assert_ne!(random_string(ALPHABET, 32), random_string(ALPHABET, 32));
    }
}

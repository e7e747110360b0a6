//! # Symmetric Token Codec
//!
//! Encrypts and decrypts the opaque secrets that travel inside
//! verification and password-reset URLs (and the password-token header).
//!
//! AES-256-GCM with a random 96-bit nonce per message; the nonce is
//! prepended to the ciphertext so the output is self-contained. The key
//! is derived once at startup by hashing the two configured secrets.
//! Corrupted or mis-encoded input never panics; it surfaces as a
//! `BadRequest("invalid data format")`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::errors::{AuthError, AuthResult};

/// Nonce length for AES-GCM (96 bits)
const NONCE_LEN: usize = 12;

/// Generic message for any codec failure; never reveals whether the
/// encoding, the nonce, or the auth tag was the problem.
const INVALID_DATA: &str = "invalid data format";

// ==================
// Text Encodings
// ==================

/// Text encodings accepted on either side of the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
    Hex,
    Base64,
    Base64Url,
}

impl Encoding {
    /// Decode a string in this encoding into raw bytes
    pub fn decode(&self, input: &str) -> AuthResult<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(input.as_bytes().to_vec()),
            Encoding::Ascii => {
                if input.is_ascii() {
                    Ok(input.as_bytes().to_vec())
                } else {
                    Err(AuthError::bad_request(INVALID_DATA))
                }
            }
            Encoding::Hex => hex::decode(input).map_err(|_| AuthError::bad_request(INVALID_DATA)),
            Encoding::Base64 => STANDARD
                .decode(input)
                .map_err(|_| AuthError::bad_request(INVALID_DATA)),
            Encoding::Base64Url => URL_SAFE_NO_PAD
                .decode(input)
                .map_err(|_| AuthError::bad_request(INVALID_DATA)),
        }
    }

    /// Encode raw bytes into a string in this encoding
    pub fn encode(&self, bytes: &[u8]) -> AuthResult<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| AuthError::bad_request(INVALID_DATA)),
            Encoding::Ascii => {
                if bytes.is_ascii() {
                    // Safe: all-ASCII bytes are valid UTF-8
                    Ok(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    Err(AuthError::bad_request(INVALID_DATA))
                }
            }
            Encoding::Hex => Ok(hex::encode(bytes)),
            Encoding::Base64 => Ok(STANDARD.encode(bytes)),
            Encoding::Base64Url => Ok(URL_SAFE_NO_PAD.encode(bytes)),
        }
    }
}

// ==================
// Token Cipher
// ==================

/// Symmetric cipher shared by all request handlers.
///
/// Read-only after construction; clone-cheap enough to live inside the
/// auth service.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Derive the cipher key from the two configured secrets.
    ///
    /// Both secrets are folded into a single SHA-256 digest, which is
    /// exactly the 32 bytes AES-256 needs.
    pub fn new(key_secret: &str, salt_secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key_secret.as_bytes());
        hasher.update(salt_secret.as_bytes());
        let key_bytes = hasher.finalize();

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext` (read as `input`) and emit in `output`.
    ///
    /// Output layout: `nonce || ciphertext || tag`, then text-encoded.
    pub fn encrypt(&self, plaintext: &str, input: Encoding, output: Encoding) -> AuthResult<String> {
        let bytes = input.decode(plaintext)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, bytes.as_ref())
            .map_err(|_| AuthError::bad_request(INVALID_DATA))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        output.encode(&out)
    }

    /// Decrypt `ciphertext` (read as `input`) and emit in `output`.
    pub fn decrypt(&self, ciphertext: &str, input: Encoding, output: Encoding) -> AuthResult<String> {
        let bytes = input.decode(ciphertext)?;
        if bytes.len() < NONCE_LEN {
            return Err(AuthError::bad_request(INVALID_DATA));
        }

        let (nonce_bytes, payload) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, payload)
            .map_err(|_| AuthError::bad_request(INVALID_DATA))?;

        output.encode(&plaintext)
    }
}

// ==================
// Tests
// ==================

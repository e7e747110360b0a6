//! # TOTP Engine
//!
//! Time-based one-time passwords per RFC 6238: HMAC-SHA1, 6 digits,
//! 30-second step, for interoperability with standard authenticator
//! apps. A generator is bound to one user's shared secret and account
//! label; validation checks the current step plus/minus a caller-chosen
//! skew window.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::errors::{AuthError, AuthResult};

// ==================
// TOTP Configuration
// ==================

/// TOTP parameters
///
/// Digits and period are fixed to the interoperable defaults; only the
/// issuer (shown in authenticator apps) comes from configuration.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer name (shown in authenticator apps)
    pub issuer: String,
    /// Number of digits
    pub digits: u32,
    /// Time step in seconds
    pub period: u64,
}

impl TotpConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            digits: 6,
            period: 30,
        }
    }
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self::new("Quill")
    }
}

// ==================
// Base32 (RFC 4648)
// ==================

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Unpadded Base32 encoding, 5 bits per output character
pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8 / 5 + 1);
    let mut acc: u64 = 0;
    let mut pending = 0;

    for &byte in data {
        acc = (acc << 8) | u64::from(byte);
        pending += 8;

        while pending >= 5 {
            pending -= 5;
            out.push(BASE32_ALPHABET[((acc >> pending) & 0x1F) as usize] as char);
        }
    }

    // Left-align whatever bits remain into a final character
    if pending > 0 {
        out.push(BASE32_ALPHABET[((acc << (5 - pending)) & 0x1F) as usize] as char);
    }

    out
}

/// Base32 decoding; tolerates lowercase and `=` padding, `None` on any
/// other character
pub(crate) fn base32_decode(encoded: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut acc: u64 = 0;
    let mut pending = 0;

    for c in encoded.chars() {
        let c = c.to_ascii_uppercase();
        if c == '=' {
            continue;
        }
        let value = BASE32_ALPHABET.iter().position(|&a| a as char == c)? as u64;
        acc = (acc << 5) | value;
        pending += 5;

        if pending >= 8 {
            pending -= 8;
            out.push((acc >> pending) as u8);
        }
    }

    Some(out)
}

// ==================
// TOTP Generator
// ==================

/// A TOTP generator bound to one user's secret and label
#[derive(Debug, Clone)]
pub struct TotpGenerator {
    secret: String,
    label: String,
    config: TotpConfig,
}

impl TotpGenerator {
    pub fn new(secret: impl Into<String>, label: impl Into<String>, config: TotpConfig) -> Self {
        Self {
            secret: secret.into(),
            label: label.into(),
            config,
        }
    }

    /// Generate the code for an explicit unix timestamp
    pub fn generate_at(&self, timestamp: u64) -> AuthResult<String> {
        let secret_bytes = base32_decode(&self.secret)
            .ok_or_else(|| AuthError::internal("invalid base32 TOTP secret"))?;

        let counter = timestamp / self.config.period;
        let counter_bytes = counter.to_be_bytes();

        let mut mac = Hmac::<Sha1>::new_from_slice(&secret_bytes)
            .map_err(|e| AuthError::internal(e))?;
        mac.update(&counter_bytes);
        let hash = mac.finalize().into_bytes();

        // Dynamic truncation (RFC 4226 §5.3)
        let offset = (hash[hash.len() - 1] & 0x0F) as usize;
        let binary = ((hash[offset] & 0x7F) as u32) << 24
            | (hash[offset + 1] as u32) << 16
            | (hash[offset + 2] as u32) << 8
            | (hash[offset + 3] as u32);

        let otp = binary % 10u32.pow(self.config.digits);
        Ok(format!("{:0>width$}", otp, width = self.config.digits as usize))
    }

    /// Generate the code for the current step
    pub fn generate(&self) -> AuthResult<String> {
        self.generate_at(now_unix()?)
    }

    /// Validate a submitted code against the current step ± `skew` steps.
    ///
    /// A no-match result carries no hint of which step would have
    /// matched. Enrollment verification uses `skew = 0`; routine
    /// validation and disable use `skew = 1` for clock drift.
    pub fn verify(&self, code: &str, skew: u32) -> AuthResult<bool> {
        self.verify_at(code, now_unix()?, skew)
    }

    /// Validate against an explicit timestamp (exposed for tests)
    pub fn verify_at(&self, code: &str, timestamp: u64, skew: u32) -> AuthResult<bool> {
        for offset in 0..=skew {
            let ahead = timestamp + u64::from(offset) * self.config.period;
            if self.generate_at(ahead)? == code {
                return Ok(true);
            }

            // Offset 0 was already covered by the forward check
            if offset > 0 {
                let behind = timestamp.saturating_sub(u64::from(offset) * self.config.period);
                if self.generate_at(behind)? == code {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// otpauth:// provisioning URI for QR rendering
    pub fn otpauth_url(&self) -> String {
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            urlencoding::encode(&self.config.issuer),
            urlencoding::encode(&self.label),
            self.secret,
            urlencoding::encode(&self.config.issuer),
            self.config.digits,
            self.config.period
        )
    }
}

fn now_unix() -> AuthResult<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AuthError::internal(e))?
        .as_secs())
}

// ==================
// Tests
// ==================

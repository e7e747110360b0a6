//! # Configuration
//!
//! TOML-backed configuration with per-field validation at startup.
//! Invalid values are collected and reported together rather than
//! failing one at a time.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default alphabet for random secrets (62 characters; modulo mapping
/// bias over 256 random values is tolerated)
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ==================
// Config Types
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    /// Optional SMTP section; without it, outgoing mail is recorded to
    /// the log only
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Everything the auth subsystem consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for session and action tokens
    pub jwt_secret: String,
    /// Cipher key material; hashed together with `cipher_salt` into the
    /// AES-256 key
    pub cipher_key: String,
    pub cipher_salt: String,

    #[serde(default = "default_alphabet")]
    pub alphabet: String,
    /// Length of the single-use secret embedded in action links
    #[serde(default = "default_secret_token_length")]
    pub secret_token_length: usize,
    /// Length of each plaintext recovery code
    #[serde(default = "default_recovery_code_length")]
    pub recovery_code_length: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_action_token_ttl")]
    pub action_token_ttl_secs: u64,

    /// Shown as the TOTP issuer and used in mail copy
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Public origin used to build verification/reset URLs
    #[serde(default = "default_origin")]
    pub origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// From address, e.g. `Quill <no-reply@quill.example>`
    pub from: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_alphabet() -> String {
    DEFAULT_ALPHABET.to_string()
}

fn default_secret_token_length() -> usize {
    120
}

fn default_recovery_code_length() -> usize {
    10
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_action_token_ttl() -> u64 {
    3_600
}

fn default_app_name() -> String {
    "Quill".to_string()
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

// ==================
// Loading & Validation
// ==================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration:\n{}", format_errors(.0))]
    Invalid(Vec<ConfigFieldError>),
}

/// One rejected configuration value
#[derive(Debug)]
pub struct ConfigFieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}': {}", self.field, self.message)
    }
}

fn format_errors(errors: &[ConfigFieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, collecting every problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut reject = |field: &str, message: &str| {
            errors.push(ConfigFieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.server.port == 0 {
            reject("server.port", "port must be between 1 and 65535");
        }
        if self.auth.jwt_secret.len() < 32 {
            reject("auth.jwt_secret", "must be at least 32 characters");
        }
        if self.auth.cipher_key.is_empty() {
            reject("auth.cipher_key", "must not be empty");
        }
        if self.auth.cipher_salt.is_empty() {
            reject("auth.cipher_salt", "must not be empty");
        }
        if self.auth.alphabet.is_empty() || !self.auth.alphabet.is_ascii() {
            reject("auth.alphabet", "must be a non-empty ASCII string");
        }
        if self.auth.secret_token_length == 0 {
            reject("auth.secret_token_length", "must be positive");
        }
        if self.auth.recovery_code_length == 0 {
            reject("auth.recovery_code_length", "must be positive");
        }
        if self.auth.action_token_ttl_secs == 0 {
            reject("auth.action_token_ttl_secs", "must be positive");
        }
        if self.auth.session_ttl_secs == 0 {
            reject("auth.session_ttl_secs", "must be positive");
        }
        if self.auth.origin.is_empty() {
            reject("auth.origin", "must not be empty");
        }
        if let Some(smtp) = &self.smtp {
            if smtp.host.is_empty() {
                reject("smtp.host", "must not be empty");
            }
            if smtp.port == 0 {
                reject("smtp.port", "port must be between 1 and 65535");
            }
            if smtp.from.is_empty() {
                reject("smtp.from", "must not be empty");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_auth() -> AuthConfig {
        AuthConfig {
            jwt_secret: "a-signing-secret-of-at-least-32-chars".to_string(),
            cipher_key: "cipher-key".to_string(),
            cipher_salt: "cipher-salt".to_string(),
            alphabet: default_alphabet(),
            secret_token_length: 120,
            recovery_code_length: 10,
            session_ttl_secs: 86_400,
            action_token_ttl_secs: 3_600,
            app_name: "Quill".to_string(),
            origin: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = Config {
            server: ServerConfig::default(),
            auth: valid_auth(),
            smtp: None,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut auth = valid_auth();
        auth.jwt_secret = "short".to_string();
        auth.secret_token_length = 0;
        let config = Config {
            server: ServerConfig::default(),
            auth,
            smtp: None,
        };

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_minimal_toml() {
        let raw = r#"
            [auth]
            jwt_secret = "a-signing-secret-of-at-least-32-chars"
            cipher_key = "cipher-key"
            cipher_salt = "cipher-salt"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.secret_token_length, 120);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert_eq!(config.auth.app_name, "Quill");
        assert!(config.smtp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            r#"
                [server]
                port = 9100

                [auth]
                jwt_secret = "a-signing-secret-of-at-least-32-chars"
                cipher_key = "cipher-key"
                cipher_salt = "cipher-salt"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9100);
    }
}

//! # Authentication & Account Security
//!
//! The security core of the API: password login with JWT sessions,
//! TOTP-based two-factor auth with one-time recovery codes, and the
//! signed/encrypted token machinery behind email verification and
//! password reset.

pub mod crypto;
pub mod email;
pub mod errors;
pub mod jwt;
pub mod password;
pub mod random;
pub mod recovery;
pub mod service;
pub mod totp;
pub mod user;

pub use crypto::{Encoding, TokenCipher};
pub use email::{EmailSender, EmailTemplate, RecordingEmailSender, SmtpEmailSender};
pub use errors::{AuthError, AuthResult};
pub use jwt::{JwtManager, TokenClaims, TokenResponse};
pub use recovery::{ConsumeOutcome, RecoveryCode, RECOVERY_CODE_COUNT};
pub use service::{AuthService, LoginResponse, OtpEnrollment, OtpSetup};
pub use totp::{TotpConfig, TotpGenerator};
pub use user::{InMemoryUserStore, User, UserPatch, UserProfile, UserStore};

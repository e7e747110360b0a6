//! # Outbound Email
//!
//! Templates and transport boundary for the verification and
//! password-reset mails. Sending is fire-and-forget from the
//! orchestration's perspective: failures are logged, never surfaced to
//! the end user.

use std::sync::Mutex;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::errors::{AuthError, AuthResult};
use crate::config::SmtpConfig;

// ==================
// Templates
// ==================

/// Rendered mail content for the two auth flows
#[derive(Debug, Clone)]
pub enum EmailTemplate {
    VerifyEmail {
        name: String,
        url: String,
        expires_minutes: i64,
    },
    PasswordReset {
        name: String,
        url: String,
        expires_minutes: i64,
    },
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::VerifyEmail { .. } => "Verify your email address",
            EmailTemplate::PasswordReset { .. } => "Reset your password",
        }
    }

    pub fn html_body(&self) -> String {
        match self {
            EmailTemplate::VerifyEmail {
                name,
                url,
                expires_minutes,
            } => format!(
                "<p>Hi {name},</p>\
                 <p>Confirm your email address by following the link below. \
                 It expires in {expires_minutes} minutes.</p>\
                 <p><a href=\"{url}\">Verify email</a></p>"
            ),
            EmailTemplate::PasswordReset {
                name,
                url,
                expires_minutes,
            } => format!(
                "<p>Hi {name},</p>\
                 <p>A password reset was requested for your account. The link \
                 below expires in {expires_minutes} minutes. If you did not \
                 request this, you can ignore this email.</p>\
                 <p><a href=\"{url}\">Reset password</a></p>"
            ),
        }
    }

    /// The action link embedded in the mail
    pub fn url(&self) -> &str {
        match self {
            EmailTemplate::VerifyEmail { url, .. } => url,
            EmailTemplate::PasswordReset { url, .. } => url,
        }
    }
}

// ==================
// Sender Boundary
// ==================

/// Mail transport boundary
pub trait EmailSender: Send + Sync {
    fn send(&self, to: &str, template: &EmailTemplate) -> AuthResult<()>;
}

/// SMTP sender over lettre's blocking transport.
///
/// Callers run `send` on a blocking task; the auth service takes care
/// of that.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> AuthResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AuthError::internal(format!("invalid from address: {e}")))?;

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| AuthError::internal(e))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, to: &str, template: &EmailTemplate) -> AuthResult<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AuthError::internal(format!("invalid recipient: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(template.subject())
            .header(ContentType::TEXT_HTML)
            .body(template.html_body())
            .map_err(|e| AuthError::internal(e))?;

        self.transport
            .send(&message)
            .map_err(|e| AuthError::internal(e))?;

        Ok(())
    }
}

/// Records outgoing mail instead of sending it; used by tests and the
/// dev server when no SMTP section is configured.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(String, EmailTemplate)>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, EmailTemplate)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(String, EmailTemplate)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl EmailSender for RecordingEmailSender {
    fn send(&self, to: &str, template: &EmailTemplate) -> AuthResult<()> {
        tracing::info!(to, subject = template.subject(), "recording outgoing email");
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), template.clone()));
        Ok(())
    }
}

// ==================
// Tests
// ==================

//! Transactional email: password-reset codes and lockout notices.
//!
//! Uses SMTP via lettre for delivery with Askama templates. When SMTP is not
//! configured, messages are logged and dropped.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// Minutes an OTP stays valid; shown in the mail body.
pub const OTP_VALID_MINUTES: i64 = 5;

#[derive(Template)]
#[template(path = "email/otp.html")]
struct OtpEmailHtml<'a> {
    username: &'a str,
    otp: &'a str,
    minutes: i64,
}

#[derive(Template)]
#[template(path = "email/otp.txt")]
struct OtpEmailText<'a> {
    username: &'a str,
    otp: &'a str,
    minutes: i64,
}

#[derive(Template)]
#[template(path = "email/account_locked.html")]
struct AccountLockedEmailHtml<'a> {
    username: &'a str,
}

#[derive(Template)]
#[template(path = "email/account_locked.txt")]
struct AccountLockedEmailText<'a> {
    username: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    smtp: Option<SmtpMailer>,
}

impl EmailService {
    /// Create the email service. `None` disables delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            return Ok(Self::disabled());
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            smtp: Some(SmtpMailer {
                transport,
                from_address: config.from_address.clone(),
            }),
        })
    }

    /// A service that logs instead of sending.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { smtp: None }
    }

    /// Send a password-reset code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_otp(&self, to: &str, username: &str, otp: &str) -> Result<(), EmailError> {
        let minutes = OTP_VALID_MINUTES;
        let html = OtpEmailHtml { username, otp, minutes }.render()?;
        let text = OtpEmailText { username, otp, minutes }.render()?;

        self.send_multipart_email(to, "Your Bazaar password reset code", &text, &html)
            .await
    }

    /// Tell a user their account was locked after repeated failed logins.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_account_locked(&self, to: &str, username: &str) -> Result<(), EmailError> {
        let html = AccountLockedEmailHtml { username }.render()?;
        let text = AccountLockedEmailText { username }.render()?;

        self.send_multipart_email(to, "Account Locked", &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(smtp) = &self.smtp else {
            tracing::warn!(to = %to, subject = %subject, "SMTP not configured, email not sent");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                smtp.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(smtp.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        smtp.transport.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Generate a 5-digit password-reset code (10000..=99999).
#[must_use]
pub fn generate_otp() -> String {
    use rand::Rng;
    let code: u32 = rand::rng().random_range(10_000..=99_999);
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_otp_format() {
        let code = generate_otp();
        assert_eq!(code.len(), 5);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_otp_range() {
        for _ in 0..100 {
            let code: u32 = generate_otp().parse().expect("valid number");
            assert!((10_000..=99_999).contains(&code));
        }
    }

    #[test]
    fn test_otp_template_renders_code() {
        let text = OtpEmailText {
            username: "shopper",
            otp: "48213",
            minutes: OTP_VALID_MINUTES,
        }
        .render()
        .expect("template renders");
        assert!(text.contains("48213"));
        assert!(text.contains("5 minutes"));
    }

    #[tokio::test]
    async fn test_disabled_service_skips_delivery() {
        let service = EmailService::disabled();
        assert!(service.send_otp("a@b.io", "shopper", "12345").await.is_ok());
    }
}

//! Outbound email for the registration workflow
//!
//! Two messages exist: the verification-code mail for new registrations and
//! the notice sent when someone tries to register with an email that already
//! has an account. Dispatch is best-effort; callers log failures and move on.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::MultiPart,
    transport::smtp::authentication::Credentials,
};
use tracing::info;

/// Outbound registration email interface
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the 6-digit verification code to a prospective user
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<()>;

    /// Notify an existing account holder that someone attempted to register
    /// with their email (the notice carries no code)
    async fn send_registration_attempt_notice(&self, to: &str) -> Result<()>;
}

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address, e.g. "no-reply@witlt.example"
    pub from_address: String,
    pub from_name: String,
}

impl SmtpConfig {
    /// Create a new SmtpConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`: SMTP relay host (default: "localhost")
    /// - `SMTP_PORT`: SMTP relay port (default: 587)
    /// - `SMTP_USERNAME` / `SMTP_PASSWORD`: relay credentials (optional)
    /// - `MAIL_FROM_ADDRESS`: sender address (default: "no-reply@witlt.local")
    /// - `MAIL_FROM_NAME`: sender display name (default: "When Is The Last Time")
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);
        let username = std::env::var("SMTP_USERNAME").ok();
        let password = std::env::var("SMTP_PASSWORD").ok();
        let from_address =
            std::env::var("MAIL_FROM_ADDRESS").unwrap_or_else(|_| "no-reply@witlt.local".to_string());
        let from_name = std::env::var("MAIL_FROM_NAME")
            .unwrap_or_else(|_| "When Is The Last Time".to_string());

        Ok(Self {
            host,
            port,
            username,
            password,
            from_address,
            from_name,
        })
    }
}

/// SMTP-backed mailer
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| anyhow::anyhow!("Failed to configure SMTP relay: {}", e))?
            .port(config.port);

        if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        let transport = builder.build();
        let from = format!("{} <{}>", config.from_name, config.from_address);

        info!("SMTP mailer initialized for relay {}:{}", config.host, config.port);

        Ok(Self { transport, from })
    }

    async fn send(&self, to: &str, subject: &str, text: String, html: String) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?,
            )
            .to(to
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid recipient address: {}", e))?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| anyhow::anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send email: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        self.send(
            to,
            "[When Is The Last Time] Your registration code",
            verification_code_text(code),
            verification_code_html(code),
        )
        .await
    }

    async fn send_registration_attempt_notice(&self, to: &str) -> Result<()> {
        self.send(
            to,
            "[When Is The Last Time] Registration attempted with your email",
            registration_attempt_text(),
            registration_attempt_html(),
        )
        .await
    }
}

fn verification_code_text(code: &str) -> String {
    format!(
        r#"Thanks for signing up for When Is The Last Time!

Your verification code is: {}

The code expires in 10 minutes. If you didn't request it, you can
safely ignore this email.
"#,
        code
    )
}

fn verification_code_html(code: &str) -> String {
    format!(
        r#"<html>
<body style="font-family: sans-serif; color: #333;">
  <p>Thanks for signing up for <strong>When Is The Last Time</strong>!</p>
  <p>Your verification code is:</p>
  <p style="font-size: 32px; font-weight: bold; letter-spacing: 6px;">{}</p>
  <p style="color: #666;">The code expires in 10 minutes. If you didn't request it, you can safely ignore this email.</p>
</body>
</html>"#,
        code
    )
}

fn registration_attempt_text() -> String {
    r#"Someone just tried to create a When Is The Last Time account with
your email address, but an account with this address already exists.

If this was you, you can simply log in with your existing account. If
it wasn't, no action is needed; nothing about your account has changed.
"#
    .to_string()
}

fn registration_attempt_html() -> String {
    r#"<html>
<body style="font-family: sans-serif; color: #333;">
  <p>Someone just tried to create a <strong>When Is The Last Time</strong> account with your email address, but an account with this address already exists.</p>
  <p>If this was you, you can simply log in with your existing account. If it wasn't, no action is needed; nothing about your account has changed.</p>
</body>
</html>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_mail_contains_code() {
        let text = verification_code_text("042137");
        let html = verification_code_html("042137");
        assert!(text.contains("042137"));
        assert!(html.contains("042137"));
    }

    #[test]
    fn test_attempt_notice_contains_no_code_slot() {
        // The notice must never leak anything resembling a code
        let text = registration_attempt_text();
        assert!(!text.chars().any(|c| c.is_ascii_digit()));
    }
}

//! Email delivery service using lettre/SMTP.
//!
//! Kept as a real ambient collaborator even though no core grant flow
//! currently depends on it — password-reset and MFA-recovery notices are
//! the obvious future callers once the admin-facing user management surface
//! lands.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    base_url: String,
}

impl EmailService {
    /// `encryption` controls the SMTP transport mode:
    /// - `"starttls"` (default): opportunistic STARTTLS on port 587
    /// - `"tls"`: implicit TLS (SMTPS) on port 465
    /// - `"none"`: unencrypted, local dev only
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        smtp_username: Option<&str>,
        smtp_password: Option<&str>,
        encryption: &str,
        from_email: String,
        base_url: String,
    ) -> Result<Self> {
        let mut builder = match encryption {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .context("failed to create SMTP relay transport")?
                .port(smtp_port),
            "none" => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(smtp_port)
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .context("failed to create SMTP STARTTLS transport")?
                .port(smtp_port),
        };

        if let (Some(user), Some(pass)) = (smtp_username, smtp_password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from_email,
            base_url,
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from_email.parse().context("invalid from email address")?)
            .to(to.parse().context("invalid recipient email address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email message")?;

        self.transport.send(email).await.context("failed to send email")?;

        Ok(())
    }

    /// Notify a user that a new MFA recovery code set was generated,
    /// invalidating any codes issued before it.
    pub async fn send_recovery_codes_issued(&self, to: &str, realm_name: &str) -> Result<()> {
        let subject = format!("New MFA recovery codes issued for {realm_name}");
        let body = format!(
            "A new set of multi-factor recovery codes was just generated for your \
             account in {realm_name}. Any previously issued codes no longer work.\n\n\
             If you did not request this, contact your administrator immediately."
        );
        self.send(to, &subject, &body).await
    }

    /// Notify a user that their password was changed.
    pub async fn send_password_changed(&self, to: &str, realm_name: &str) -> Result<()> {
        let subject = format!("Your password was changed for {realm_name}");
        let body = format!(
            "The password for your account in {realm_name} was just changed.\n\n\
             If you did not make this change, contact your administrator immediately.\n\n\
             {}",
            self.base_url
        );
        self.send(to, &subject, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_is_lazy_and_succeeds_for_any_host() {
        let result = EmailService::new(
            "nonexistent.invalid",
            587,
            None,
            None,
            "starttls",
            "no-reply@example.com".to_string(),
            "http://localhost:8080".to_string(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn supports_implicit_tls_mode() {
        let result = EmailService::new(
            "nonexistent.invalid",
            465,
            None,
            None,
            "tls",
            "no-reply@example.com".to_string(),
            "http://localhost:8080".to_string(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn supports_unencrypted_dev_mode() {
        let result = EmailService::new(
            "localhost",
            25,
            None,
            None,
            "none",
            "no-reply@example.com".to_string(),
            "http://localhost:8080".to_string(),
        );
        assert!(result.is_ok());
    }
}

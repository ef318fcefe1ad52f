//! Email adapter — SMTP sending via async lettre, one message per recipient.
//! Send failures propagate so the dispatcher can catch them per-recipient.
//! Delivery is fire-and-forget: no confirmation is tracked.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use lifesign_core::config::EmailConfig;
use lifesign_core::error::{LifesignError, Result};
use lifesign_core::traits::EmailChannel;
use lifesign_core::types::OutgoingEmail;

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| LifesignError::Channel(format!("invalid from address: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| LifesignError::Channel(format!("invalid to address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text_body.clone(),
                email.html_body.clone(),
            ))
            .map_err(|e| LifesignError::Channel(format!("build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| LifesignError::Channel(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| LifesignError::Channel(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {}", email.to);
        Ok(())
    }
}

#[async_trait]
impl EmailChannel for Mailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if !self.config.enabled {
            return Err(LifesignError::Channel("email channel is disabled".into()));
        }
        self.deliver(&email).await
    }
}

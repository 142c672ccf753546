//! Outbound email.
//!
//! Providers:
//! - `console`: logs the message (development)
//! - `mailgun`: Mailgun HTTP API

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::EmailConfig;
use crate::middleware::metrics::record_email_sent;

const MAILGUN_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured: {0}")]
    NotConfigured(String),

    #[error("Message has no recipients")]
    NoRecipients,

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Email message to be sent.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Metric label, e.g. `contact_notification`.
    pub kind: &'static str,
    pub to: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

impl EmailMessage {
    pub fn new(
        kind: &'static str,
        to: Vec<String>,
        subject: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            to,
            reply_to: None,
            subject: subject.into(),
            body_text: body_text.into(),
            body_html: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Mailgun form fields.
    fn form_fields(&self, sender: &str) -> Vec<(&'static str, String)> {
        let mut fields = vec![("from", sender.to_string())];
        fields.extend(self.to.iter().map(|to| ("to", to.clone())));
        fields.push(("subject", self.subject.clone()));
        fields.push(("text", self.body_text.clone()));
        if let Some(html) = &self.body_html {
            fields.push(("html", html.clone()));
        }
        if let Some(reply_to) = &self.reply_to {
            fields.push(("h:Reply-To", reply_to.clone()));
        }
        fields
    }
}

#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(MAILGUN_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmailError::NotConfigured(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Team inboxes for lead notifications.
    pub fn recipients(&self) -> Vec<String> {
        self.config.recipients.clone()
    }

    /// Sends through the configured provider. A disabled service succeeds
    /// without sending anything.
    pub async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        if !self.config.enabled {
            debug!(
                to = ?message.to,
                subject = %message.subject,
                "Email service disabled, skipping send"
            );
            return Ok(());
        }

        if message.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }

        let kind = message.kind;
        let result = match self.config.provider.as_str() {
            "console" => self.send_console(message),
            "mailgun" => self.send_mailgun(message).await,
            provider => Err(EmailError::NotConfigured(format!(
                "unknown provider {}",
                provider
            ))),
        };

        record_email_sent(kind, if result.is_ok() { "success" } else { "error" });
        result
    }

    fn send_console(&self, message: EmailMessage) -> Result<(), EmailError> {
        info!(
            kind = message.kind,
            from = %self.config.sender,
            to = ?message.to,
            reply_to = ?message.reply_to,
            subject = %message.subject,
            "Email (console provider)"
        );
        debug!(body = %message.body_text, "Email body");
        Ok(())
    }

    async fn send_mailgun(&self, message: EmailMessage) -> Result<(), EmailError> {
        if self.config.mailgun_api_key.is_empty() || self.config.mailgun_domain.is_empty() {
            return Err(EmailError::NotConfigured(
                "mailgun api key or domain missing".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.config.mailgun_endpoint())
            .basic_auth("api", Some(&self.config.mailgun_api_key))
            .form(&message.form_fields(&self.config.sender))
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("Mailgun request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            info!(
                kind = message.kind,
                to = ?message.to,
                subject = %message.subject,
                "Email sent via Mailgun"
            );
            Ok(())
        } else {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_body, "Mailgun API error");
            Err(EmailError::ProviderError(format!(
                "Mailgun returned {}: {}",
                status, error_body
            )))
        }
    }
}

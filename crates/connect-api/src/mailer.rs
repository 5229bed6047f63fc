use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// One outbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outbound mail port. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}

/// Posts mail as JSON to an HTTP relay.
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    mail: &'a OutgoingMail,
}

impl HttpMailer {
    pub fn new(relay_url: String, api_key: Option<String>, from: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relay_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let payload = RelayPayload {
            from: &self.from,
            mail,
        };

        let mut request = self.client.post(&self.relay_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request.send().await?.error_for_status()?;
        debug!("Mail relay accepted message to {}", mail.to);
        Ok(())
    }
}

/// Development mailer: writes mail to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        info!("Mail relay not configured; '{}' to {}:\n{}", mail.subject, mail.to, mail.text);
        Ok(())
    }
}

/// The activation code email.
pub fn otp_mail(to: &str, code: &str, expires_at: DateTime<Utc>, ttl_minutes: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Account Activation OTP".to_string(),
        text: format!(
            "Your OTP is: {}. Expires in {} minutes (at {}).",
            code,
            ttl_minutes,
            expires_at.format("%H:%M UTC")
        ),
        html: format!(
            "<h2>Startup Connect OTP Verification</h2>\
             <p>Your One-Time Password (OTP) for Startup Connect is:</p>\
             <p style=\"font-size: 24px; font-weight: bold; letter-spacing: 2px;\">{}</p>\
             <p>This OTP is valid for {} minutes. Please do not share this code with anyone.</p>\
             <p>If you did not request this OTP, please ignore this email.</p>",
            code, ttl_minutes
        ),
    }
}

//! Outgoing email for login codes.
//!
//! Production uses an HTTP email API (Postmark-compatible JSON). Without a
//! configured provider, messages land in an in-process [`Outbox`] and the
//! code is written to the log so local setups can still sign in.

use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpEmailClient {
    http: reqwest::Client,
    base_url: String,
    sender: String,
    api_token: String,
}

impl HttpEmailClient {
    pub fn new(base_url: &str, sender: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            sender: sender.to_string(),
            api_token: api_token.to_string(),
        })
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let url = format!("{}/email", self.base_url);
        let body = SendEmailRequest {
            from: &self.sender,
            to: &email.to,
            subject: &email.subject,
            text_body: &email.text_body,
        };
        self.http
            .post(&url)
            .header("X-Postmark-Server-Token", &self.api_token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Messages an [`Outbox`] keeps; older ones are dropped.
pub const OUTBOX_CAPACITY: usize = 100;

/// In-memory sink used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<VecDeque<OutgoingEmail>>>,
}

impl Outbox {
    fn push(&self, email: OutgoingEmail) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        if sent.len() == OUTBOX_CAPACITY {
            sent.pop_front();
        }
        sent.push_back(email);
    }

    pub fn messages(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Most recent message addressed to `to`.
    pub fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.messages().into_iter().rev().find(|m| m.to == to)
    }
}

#[derive(Debug, Clone)]
pub enum Mailer {
    Http(HttpEmailClient),
    Outbox(Outbox),
}

impl Mailer {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        if cfg.api_base_url.trim().is_empty() {
            tracing::warn!("No email provider configured; login codes will only be logged");
            return Ok(Mailer::Outbox(Outbox::default()));
        }
        let client = HttpEmailClient::new(
            &cfg.api_base_url,
            &cfg.sender,
            &cfg.api_token,
            Duration::from_millis(cfg.timeout_ms),
        )?;
        Ok(Mailer::Http(client))
    }

    pub async fn send(&self, email: OutgoingEmail) -> Result<()> {
        match self {
            Mailer::Http(client) => client.send(&email).await,
            Mailer::Outbox(outbox) => {
                tracing::info!(to = %email.to, subject = %email.subject, "Outbox email: {}", email.text_body);
                outbox.push(email);
                Ok(())
            }
        }
    }

    pub async fn send_login_code(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<()> {
        self.send(OutgoingEmail {
            to: to.to_string(),
            subject: "Your sign-in verification code".to_string(),
            text_body: format!(
                "Your verification code is {}. It expires in {} minutes. \
                 If you did not try to sign in, contact your administrator.",
                code, ttl_minutes
            ),
        })
        .await
    }

    pub fn outbox(&self) -> Option<&Outbox> {
        match self {
            Mailer::Outbox(outbox) => Some(outbox),
            Mailer::Http(_) => None,
        }
    }
}

/// Pull the six-digit code back out of a login email body.
pub fn extract_code(body: &str) -> Option<String> {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == crate::auth::two_factor::CODE_DIGITS)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_records_login_code() {
        let mailer = Mailer::from_config(&EmailConfig::default()).expect("outbox mailer");
        mailer
            .send_login_code("nurse@clinic.test", "042917", 3)
            .await
            .expect("send");

        let outbox = mailer.outbox().expect("outbox variant");
        let msg = outbox.last_to("nurse@clinic.test").expect("message recorded");
        assert_eq!(extract_code(&msg.text_body).as_deref(), Some("042917"));
        assert!(outbox.last_to("someone@else.test").is_none());
    }

    #[test]
    fn test_http_client_when_provider_configured() {
        let cfg = EmailConfig {
            api_base_url: "https://api.postmarkapp.com/".to_string(),
            api_token: "token".to_string(),
            sender: "clinic@example.org".to_string(),
            timeout_ms: 1000,
        };
        match Mailer::from_config(&cfg).expect("http mailer") {
            Mailer::Http(client) => assert_eq!(client.base_url, "https://api.postmarkapp.com"),
            Mailer::Outbox(_) => panic!("expected HTTP mailer"),
        }
    }

    #[tokio::test]
    async fn test_outbox_keeps_only_recent_messages() {
        let outbox = Outbox::default();
        let mailer = Mailer::Outbox(outbox.clone());
        for i in 0..OUTBOX_CAPACITY + 5 {
            mailer
                .send_login_code(&format!("user{}@clinic.test", i), "123456", 3)
                .await
                .expect("send");
        }

        let messages = outbox.messages();
        assert_eq!(messages.len(), OUTBOX_CAPACITY);
        assert_eq!(messages[0].to, "user5@clinic.test");
        assert!(outbox.last_to("user0@clinic.test").is_none());
        assert!(outbox.last_to(&format!("user{}@clinic.test", OUTBOX_CAPACITY + 4)).is_some());
    }

    #[test]
    fn test_extract_code_ignores_other_numbers() {
        assert_eq!(
            extract_code("Your verification code is 000123. It expires in 3 minutes.").as_deref(),
            Some("000123")
        );
        assert_eq!(extract_code("no code here 12"), None);
    }
}

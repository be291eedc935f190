//! Email delivery through the SendGrid v3 API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use travel_agent_core::email::{EmailMessage, EmailSender, SendError};

use crate::settings::EmailSettings;

const DEFAULT_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// A non-success answer from SendGrid.
#[derive(Debug, Error)]
#[error("SendGrid returned HTTP {status}: {body}")]
pub struct SendGridError {
    /// The HTTP status code.
    pub status: u16,
    /// The response body, usually a JSON list of errors.
    pub body: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

/// Sends the trip email with SendGrid.
#[derive(Clone, Debug)]
pub struct SendGridSender {
    client: Client,
    settings: EmailSettings,
    endpoint: String,
}

impl SendGridSender {
    /// Creates a sender that mails `settings.to` from `settings.from`.
    #[inline]
    pub fn new(settings: EmailSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }

    /// Sets a custom endpoint.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload<'a>(&'a self, html: &'a str) -> MailSend<'a> {
        MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: &self.settings.to,
                }],
            }],
            from: Address {
                email: &self.settings.from,
            },
            subject: &self.settings.subject,
            content: [Content {
                kind: "text/html",
                value: html,
            }],
        }
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    async fn send(&self, message: &EmailMessage) -> Result<u16, SendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&self.payload(&message.html))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Box::new(SendGridError {
                status: status.as_u16(),
                body,
            }));
        }
        debug!("sendgrid accepted the email: {status}");
        Ok(status.as_u16())
    }
}

//! The email step of the graph.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

/// Boxed error returned by an [`EmailSender`].
pub type SendError = Box<dyn StdError + Send + Sync>;

/// An email ready to be delivered. Recipients and subject are the sender's
/// concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    /// The HTML body.
    pub html: String,
}

/// Delivers rendered emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends the email and returns the status code reported by the service.
    async fn send(&self, message: &EmailMessage) -> Result<u16, SendError>;
}

#[async_trait]
impl<T: EmailSender + ?Sized> EmailSender for Arc<T> {
    async fn send(&self, message: &EmailMessage) -> Result<u16, SendError> {
        (**self).send(message).await
    }
}

/// The outcome of the email step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailDelivery {
    /// The service accepted the email.
    Sent {
        /// Status code reported by the service.
        status: u16,
    },
    /// The email could not be sent.
    Failed(String),
}

/// Removes a Markdown code fence wrapped around `text`, which models tend
/// to add around generated HTML.
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string, like `html`.
        text = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```html\n<p>Rome</p>\n```\n"),
            "<p>Rome</p>"
        );
        assert_eq!(strip_code_fence("```\n<p>Rome</p>```"), "<p>Rome</p>");
        assert_eq!(strip_code_fence("  <p>Rome</p>  "), "<p>Rome</p>");
        assert_eq!(
            strip_code_fence("<pre>```x```</pre>"),
            "<pre>```x```</pre>"
        );
    }
}

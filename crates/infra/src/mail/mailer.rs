//! Mail transport abstraction and settings.

use async_trait::async_trait;
use tracing::info;

use super::message::Message;

/// Mail transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    #[error("failed to send mail to {to}: {reason}")]
    Send { to: String, reason: String },

    #[error("mail queue is closed")]
    QueueClosed,
}

impl MailError {
    pub fn send(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Send {
            to: to.into(),
            reason: reason.into(),
        }
    }
}

/// Transport settings plus the defaults applied to outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub encryption: String,
    pub from_address: String,
    pub from_name: String,
    /// Capacity of the dispatcher's input queue.
    pub queue_size: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            host: "localhost".to_string(),
            port: 1025,
            encryption: "none".to_string(),
            from_address: "info@example.com".to_string(),
            from_name: "Info".to_string(),
            queue_size: 100,
        }
    }
}

/// Sends a single message. May be slow and may fail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), MailError>;
}

/// Development transport: logs the message instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &Message) -> Result<(), MailError> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            template = ?message.template,
            attachments = message.attachments.len(),
            "mail delivered (log transport)"
        );
        Ok(())
    }
}

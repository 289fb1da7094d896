//! # Mail Transport
//!
//! Delivery of fully-rendered emails. The only contract is "accept a
//! message and either succeed or report the transport error"; retries
//! belong to the notification worker.
//!
//! | Implementation | Used when |
//! |----------------|-----------|
//! | `SmtpMailer` | `EMAIL_USER` and `EMAIL_PASS` are set |
//! | `LogMailer` | No SMTP credentials (local development) |

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpSettings;

/// Errors from building or sending an email.
#[derive(Error, Debug)]
pub enum MailError {
    /// Sender or recipient is not a valid mailbox
    #[error("Invalid address {0}: {1}")]
    InvalidAddress(String, String),

    /// The message could not be assembled
    #[error("Failed to build message: {0}")]
    BuildError(String),

    /// The relay rejected or dropped the message
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Something that can deliver an [`EmailMessage`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// SMTP delivery over a STARTTLS relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the relay transport. No connection is opened until the first
    /// send.
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                MailError::InvalidAddress(from.to_string(), e.to_string())
            })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::TransportError(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        info!(
            "SMTP mailer configured: {}:{} as {}",
            settings.host, settings.port, from
        );

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                MailError::InvalidAddress(message.to.clone(), e.to_string())
            })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| MailError::BuildError(e.to_string()))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| MailError::TransportError(e.to_string()))?;

        debug!(
            "SMTP accepted message to {}: {}",
            message.to,
            response.code()
        );
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            "📧 [mail disabled] to={} subject={:?} ({} bytes)",
            message.to,
            message.subject,
            message.html_body.len()
        );
        Ok(())
    }
}

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::debug;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Submission port; the connection is upgraded with STARTTLS.
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid address {address}: {source}")]
    InvalidAddress {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("{0}")]
    Message(#[from] lettre::error::Error),

    #[error("{0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("{0}")]
    Other(String),
}

/// Sender login for the SMTP server: the sender address and its app password.
#[derive(Clone)]
pub struct SmtpCredentials {
    pub address: String,
    pub secret: String,
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("address", &self.address)
            .field("secret", &"***")
            .finish()
    }
}

/// A plain-text message ready to go out.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends one message and reports the outcome as a value.
///
/// Implementations own connection setup and authentication. A failure for
/// one recipient must come back as `Err`, never as a panic.
pub trait EmailDispatcher: Send + Sync {
    fn send(&self, credentials: &SmtpCredentials, envelope: &Envelope) -> Result<(), DispatchError>;
}

/// Dispatcher backed by a blocking lettre SMTP transport. One connection is
/// opened per message.
#[derive(Debug, Clone)]
pub struct SmtpDispatcher {
    host: String,
    port: u16,
}

impl SmtpDispatcher {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        SmtpDispatcher {
            host: host.into(),
            port,
        }
    }

    fn transport(&self, credentials: &SmtpCredentials) -> Result<SmtpTransport, DispatchError> {
        let creds = Credentials::new(credentials.address.clone(), credentials.secret.clone());

        Ok(SmtpTransport::starttls_relay(&self.host)?
            .credentials(creds)
            .port(self.port)
            .build())
    }
}

impl Default for SmtpDispatcher {
    fn default() -> Self {
        SmtpDispatcher::new(DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT)
    }
}

impl EmailDispatcher for SmtpDispatcher {
    fn send(&self, credentials: &SmtpCredentials, envelope: &Envelope) -> Result<(), DispatchError> {
        let email = build_message(envelope)?;
        debug!("sending to {} via {}:{}", envelope.to, self.host, self.port);
        self.transport(credentials)?.send(&email)?;
        Ok(())
    }
}

/// Build the RFC 5322 message for an envelope.
pub fn build_message(envelope: &Envelope) -> Result<Message, DispatchError> {
    let from = parse_mailbox(&envelope.from)?;
    let to = parse_mailbox(&envelope.to)?;

    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(envelope.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(envelope.body.clone())?)
}

fn parse_mailbox(address: &str) -> Result<lettre::message::Mailbox, DispatchError> {
    address
        .trim()
        .parse()
        .map_err(|source| DispatchError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(to: &str) -> Envelope {
        Envelope {
            from: "sam@example.com".into(),
            to: to.into(),
            subject: "Hello".into(),
            body: "Dear Ann".into(),
        }
    }

    #[test]
    fn builds_plain_text_message() {
        let message = build_message(&envelope("ann@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ann@example.com"));
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("Dear Ann"));
    }

    #[test]
    fn bad_recipient_is_an_error_value() {
        let err = build_message(&envelope("not an address")).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddress { ref address, .. } if address == "not an address"));
    }

    #[test]
    fn credentials_debug_hides_the_secret() {
        let creds = SmtpCredentials {
            address: "sam@example.com".into(),
            secret: "abcd efgh".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("abcd"));
    }
}

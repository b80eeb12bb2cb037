//! Typed error handling for delivery operations.
//!
//! Every way a delivery can end badly is one of:
//! - Permanent failures (5xx SMTP codes, unresolvable hosts) - reported `D`
//! - Temporary failures (4xx SMTP codes, connection trouble, timeouts) - reported `Z`
//! - Configuration errors (unreadable or malformed control files) - reported `Z`
//! - Protocol errors (replies that are not SMTP) - reported `Z`

use qremote_common::error::ControlError;
use qremote_smtp::client::{ClientError, ReplyClass, Response};
use thiserror::Error;

use crate::{DnsError, deadline::Expired, report::Tag};

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that can be retried later (e.g., 4xx SMTP codes).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// The control files could not be used.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ControlError),

    /// The remote host sent something that is not an SMTP reply.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Permanent errors that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// A configured or MX-provided host name does not resolve.
    #[error("Sorry, I couldn't resolve hostname {0}.")]
    ResolveHostFailed(String),

    /// Neither MX records nor an address exist for the destination.
    #[error("Sorry, I couldn't find a mail exchanger or IP address for {0}.")]
    NoMailExchanger(String),

    #[error("Connected to remote host, but sender was rejected. Remote host said: {0}")]
    SenderRejected(String),

    /// Every recipient was refused, so the message was never offered.
    #[error("Giving up on {0}.")]
    AllRecipientsRejected(String),

    #[error("Failed on DATA command. Remote host said: {0}")]
    DataRejected(String),

    #[error("Remote host rejected the message. Remote host said: {0}")]
    MessageRejected(String),
}

/// Temporary errors; the queue manager will try again later.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// No (local, remote) pair produced a usable session.
    #[error("Sorry, I wasn't able to establish an SMTP connection to {remotes}. {reason}")]
    NoConnection { remotes: String, reason: String },

    /// The delivery deadline passed.
    #[error("Sorry, timeout occurred while talking to remote host during {0}.")]
    DeadlineExceeded(&'static str),

    /// A single step ran past its own limit.
    #[error("Connection timed out: {0}")]
    Timeout(String),

    /// One connection attempt failed; others may still succeed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication with remote host failed: {0}")]
    AuthFailed(String),

    #[error("Connected to remote host, but sender was rejected. Remote host said: {0}")]
    SenderRejected(String),

    #[error("Failed on DATA command. Remote host said: {0}")]
    DataRejected(String),

    #[error("Remote host deferred the message. Remote host said: {0}")]
    MessageDeferred(String),

    /// Writing the message body failed part way.
    #[error("Connection dropped while sending the message: {0}")]
    DataWrite(String),

    #[error("Connection to remote host lost: {0}")]
    ConnectionLost(String),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// DNS lookup failed (temporary network issue).
    #[error("DNS lookup failed: {0}")]
    DnsLookupFailed(String),

    /// The message could not be read from standard input.
    #[error("Unable to read message: {0}")]
    MessageUnreadable(String),

    /// The settings file exists but cannot be used.
    #[error("Unable to load settings: {0}")]
    Settings(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        !self.is_permanent()
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this error ends the whole delivery rather than one
    /// connection attempt.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Temporary(TemporaryError::DeadlineExceeded(_))
        )
    }

    /// The record tag this error is reported with.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        if self.is_permanent() {
            Tag::Permanent
        } else {
            Tag::Temporary
        }
    }

    /// Enhanced status code for the classic failure modes.
    ///
    /// Rejections echo the remote server's reply instead and carry none.
    #[must_use]
    pub const fn status_code(&self) -> Option<&'static str> {
        match self {
            Self::Permanent(
                PermanentError::ResolveHostFailed(_) | PermanentError::NoMailExchanger(_),
            ) => Some("5.4.4"),
            Self::Temporary(
                TemporaryError::NoConnection { .. }
                | TemporaryError::DeadlineExceeded(_)
                | TemporaryError::Timeout(_)
                | TemporaryError::ConnectionFailed(_),
            ) => Some("4.4.1"),
            Self::Temporary(
                TemporaryError::ConnectionLost(_)
                | TemporaryError::DataWrite(_)
                | TemporaryError::TlsHandshakeFailed(_),
            )
            | Self::Protocol(_) => Some("4.4.2"),
            Self::Temporary(TemporaryError::DnsLookupFailed(_)) => Some("4.4.3"),
            Self::Temporary(TemporaryError::AuthFailed(_)) => Some("4.7.0"),
            Self::Temporary(TemporaryError::MessageUnreadable(_) | TemporaryError::Settings(_))
            | Self::Configuration(_) => Some("4.3.0"),
            _ => None,
        }
    }

    /// What went wrong, without the status code.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Permanent(err) => err.to_string(),
            Self::Temporary(err) => err.to_string(),
            Self::Configuration(err) => format!("Unable to read control files: {err}"),
            Self::Protocol(reply) => {
                format!("Sorry, I don't understand the remote host's reply: {reply}")
            }
        }
    }

    /// The human-readable part of the failure record.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let message = self.message();
        match self.status_code() {
            Some(code) => format!("{message} (#{code})"),
            None => message,
        }
    }

    /// Classify a rejection reply to one of the envelope or data commands.
    #[must_use]
    pub fn from_rejection(
        response: &Response,
        permanent: fn(String) -> PermanentError,
        temporary: fn(String) -> TemporaryError,
    ) -> Option<Self> {
        match response.class() {
            ReplyClass::Success => None,
            ReplyClass::Transient => Some(Self::Temporary(temporary(response.to_string()))),
            ReplyClass::Permanent => Some(Self::Permanent(permanent(response.to_string()))),
        }
    }
}

/// Convert from `DnsError` to `DeliveryError`.
///
/// Missing records are permanent; failing resolvers are temporary.
impl From<DnsError> for DeliveryError {
    fn from(error: DnsError) -> Self {
        match error {
            DnsError::NoMailServers(host) | DnsError::DomainNotFound(host) => {
                Self::Permanent(PermanentError::NoMailExchanger(host))
            }
            DnsError::NoAddresses(host) => Self::Permanent(PermanentError::ResolveHostFailed(host)),
            DnsError::NoNames(ip) => {
                Self::Permanent(PermanentError::ResolveHostFailed(ip.to_string()))
            }
            DnsError::LookupFailed(err) => {
                Self::Temporary(TemporaryError::DnsLookupFailed(err.to_string()))
            }
        }
    }
}

/// Convert from SMTP `ClientError` to `DeliveryError`.
///
/// - **4xx SMTP codes** → Temporary
/// - **5xx SMTP codes** → Permanent
/// - **Connection/I/O errors** → Temporary
/// - **TLS errors** → Temporary
/// - **Unparseable replies** → Protocol
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::SmtpError { code, message } if (500..600).contains(&code) => {
                Self::Permanent(PermanentError::MessageRejected(format!("{code} {message}")))
            }

            ClientError::SmtpError { code, message } => {
                Self::Temporary(TemporaryError::MessageDeferred(format!("{code} {message}")))
            }

            ClientError::UnexpectedResponse { code, message } => {
                Self::Protocol(format!("unexpected reply {code} {message}"))
            }

            ClientError::Io(e) => Self::Temporary(TemporaryError::ConnectionLost(e.to_string())),

            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionLost(
                "Connection closed unexpectedly".to_string(),
            )),

            ClientError::TlsError(msg) => Self::Temporary(TemporaryError::TlsHandshakeFailed(msg)),

            ClientError::AuthError(msg) => Self::Temporary(TemporaryError::AuthFailed(msg)),

            ClientError::ParseError(msg) => Self::Protocol(msg),
        }
    }
}

impl From<Expired> for DeliveryError {
    fn from(expired: Expired) -> Self {
        match expired {
            Expired::Deadline(step) => Self::Temporary(TemporaryError::DeadlineExceeded(step)),
            step @ Expired::Step { .. } => Self::Temporary(TemporaryError::Timeout(step.to_string())),
        }
    }
}

//! # Error Types
//!
//! Error records produced during a dispatch/correlate cycle, and the
//! synchronous validation errors of the operation model.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while constructing a signing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Container signing needs exactly one reference per digest.
    #[error("Digests must pair with references: {digests} digests, {references} references")]
    MismatchedPairs { digests: usize, references: usize },

    /// The signer does not handle this kind of operation.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Where an error record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Link,
    Session,
    Connection,
    Transport,
    /// The receive deadline.
    Timer,
    /// Turning an envelope into message text.
    Encoding,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Link => "link",
            Self::Session => "session",
            Self::Connection => "connection",
            Self::Transport => "transport",
            Self::Timer => "timer",
            Self::Encoding => "encoding",
        };
        f.write_str(name)
    }
}

/// A failure observed inside one send or receive attempt.
///
/// Records are appended to the attempt's error log and never thrown across
/// the event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub description: String,
    pub source: ErrorSource,
}

impl ErrorRecord {
    /// Name of the record appended when the receive deadline fires.
    pub const MESSAGING_TIMEOUT: &'static str = "MessagingTimeout";

    /// Name of the record appended when a receive connection drops early.
    pub const DISCONNECTED: &'static str = "ConnectionError";

    /// Name of the record appended when a body cannot be serialized.
    pub const ENCODING_ERROR: &'static str = "EncodingError";

    pub fn new(name: impl Into<String>, description: impl Into<String>, source: ErrorSource) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source,
        }
    }

    /// The record for an expired receive deadline.
    #[must_use]
    pub fn messaging_timeout() -> Self {
        Self::new(
            Self::MESSAGING_TIMEOUT,
            "Out of time when receiving messages",
            ErrorSource::Timer,
        )
    }

    /// The record for a receive connection that ended before every awaited
    /// reply arrived.
    #[must_use]
    pub fn disconnected(remaining: usize) -> Self {
        Self::new(
            Self::DISCONNECTED,
            format!("Disconnected before all replies arrived ({remaining} missing)"),
            ErrorSource::Connection,
        )
    }

    #[must_use]
    pub fn encoding(description: impl Into<String>) -> Self {
        Self::new(Self::ENCODING_ERROR, description, ErrorSource::Encoding)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.name == Self::MESSAGING_TIMEOUT
    }

    /// Join records into the multi-line message reported to callers.
    #[must_use]
    pub fn join(records: &[ErrorRecord]) -> String {
        records.iter().map(|r| format!("{r}\n")).collect()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.name, self.description)
    }
}

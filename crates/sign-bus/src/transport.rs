//! # Bus Capability
//!
//! What the signing engine needs from a pub/sub messaging client. Connection
//! establishment, TLS and framing belong to the implementation; the engine
//! only connects, opens links, sends, accepts and consumes events.

use async_trait::async_trait;
use sign_types::{ErrorRecord, ErrorSource, Headers};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How the client authenticates the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerAuthentication {
    /// Encrypt without verifying the peer's identity.
    #[default]
    Anonymous,
    /// Verify the peer certificate against the CA trust anchor.
    VerifyPeer,
}

/// Transport security for a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Client certificate (PEM, key included).
    pub client_cert: Option<PathBuf>,
    /// CA trust anchor.
    pub ca_cert: Option<PathBuf>,
    pub peer_authentication: PeerAuthentication,
}

/// Broker URLs plus the security used to reach them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub urls: Vec<String>,
    pub tls: TlsSettings,
}

impl BrokerEndpoint {
    pub fn new(urls: Vec<String>, tls: TlsSettings) -> Self {
        Self { urls, tls }
    }
}

/// A message handed to the bus for publication.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub address: String,
    /// Message properties.
    pub properties: Headers,
    /// Text payload.
    pub body: String,
}

/// A message delivered to a receiver. Stays unsettled until accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: u64,
    pub address: String,
    pub properties: Headers,
    pub body: String,
}

/// Endpoint on which a transport fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Link,
    Session,
    Connection,
    Transport,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Link => "link",
            Self::Session => "session",
            Self::Connection => "connection",
            Self::Transport => "transport",
        };
        f.write_str(name)
    }
}

/// Transport-level failure reported by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {condition}")]
pub struct TransportFault {
    pub kind: FaultKind,
    /// Error condition as reported by the local or remote endpoint.
    pub condition: String,
}

impl TransportFault {
    pub fn new(kind: FaultKind, condition: impl Into<String>) -> Self {
        Self {
            kind,
            condition: condition.into(),
        }
    }

    /// Convert into the error record appended to an attempt's error log.
    #[must_use]
    pub fn to_record(&self) -> ErrorRecord {
        let (name, source) = match self.kind {
            FaultKind::Link => ("LinkError", ErrorSource::Link),
            FaultKind::Session => ("SessionError", ErrorSource::Session),
            FaultKind::Connection => ("ConnectionError", ErrorSource::Connection),
            FaultKind::Transport => ("TransportError", ErrorSource::Transport),
        };
        ErrorRecord::new(name, self.condition.clone(), source)
    }
}

/// Events delivered by an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The sender has credit for one more message.
    Sendable,
    /// The broker acknowledged a sent message.
    Accepted { tag: u64 },
    /// A message arrived on the open receiver.
    Message(Delivery),
    /// The connection dropped.
    Disconnected,
    /// A link, session, connection or transport error.
    Fault(TransportFault),
}

/// Entry point of a messaging client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Open a connection to the first reachable broker.
    async fn connect(
        &self,
        urls: &[String],
        tls: &TlsSettings,
    ) -> Result<Box<dyn BusConnection>, TransportFault>;
}

/// One open connection, driven by its event stream.
#[async_trait]
pub trait BusConnection: Send {
    /// Open an anonymous sender; messages carry their own address.
    async fn open_sender(&mut self) -> Result<(), TransportFault>;

    /// Open a receiver consuming from `address`.
    async fn open_receiver(&mut self, address: &str) -> Result<(), TransportFault>;

    /// Publish a message. Acknowledgment arrives later as `BusEvent::Accepted`.
    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportFault>;

    /// Settle a delivery as accepted.
    async fn accept(&mut self, tag: u64) -> Result<(), TransportFault>;

    /// Wait for the next event. Returns `None` once the connection is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> Option<BusEvent>;

    /// Close the receiver. Unsettled deliveries are released for redelivery.
    async fn close_receiver(&mut self);

    /// Close the connection and every link on it.
    async fn close(&mut self);
}

//! # Sign Bus - Messaging Capability for the Signing Engine
//!
//! The engine talks to a pub/sub broker through two traits:
//!
//! - [`MessageBus`] opens connections to a list of broker URLs.
//! - [`BusConnection`] opens links, sends, settles deliveries and yields
//!   [`BusEvent`]s.
//!
//! ## Event Flow
//!
//! ```text
//! ┌──────────────┐   send()    ┌──────────────┐   responder   ┌──────────────┐
//! │  Dispatcher  │ ──────────► │    Broker    │ ────────────► │   Signing    │
//! └──────────────┘             │              │               │  Authority   │
//!                              │   queues     │ ◄──────────── │              │
//! ┌──────────────┐ next_event  │              │    replies    └──────────────┘
//! │  Correlator  │ ◄────────── │              │
//! └──────────────┘             └──────────────┘
//! ```
//!
//! [`InMemoryBroker`] implements the capability inside one process. Real
//! messaging clients plug in behind the same traits.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod connection;
pub mod transport;

// Re-export main types
pub use broker::{ConnectionPlan, InMemoryBroker, Responder};
pub use connection::InMemoryConnection;
pub use transport::{
    BrokerEndpoint, BusConnection, BusEvent, Delivery, FaultKind, MessageBus, OutboundMessage,
    PeerAuthentication, TlsSettings, TransportFault,
};

/// URL scheme expected for TLS broker endpoints.
pub const SECURE_SCHEME: &str = "amqps";

/// Whether a broker URL asks for a TLS connection.
#[must_use]
pub fn is_secure_url(url: &str) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(SECURE_SCHEME))
}

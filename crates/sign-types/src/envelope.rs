//! # Message Envelope
//!
//! The unit moved over the bus: routing headers, a destination address and a
//! JSON body.
//!
//! ## Correlation
//!
//! - Requests carry their correlation identifier in the body under
//!   [`REQUEST_ID_FIELD`].
//! - Headers classify the message (service, environment, owner, type) and are
//!   never used for correlation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body key holding the correlation identifier of a request.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Message properties. Values are scalars.
pub type Headers = BTreeMap<String, Value>;

/// Message payload. Serialized with sorted keys, which makes the text form
/// canonical.
pub type Body = serde_json::Map<String, Value>;

/// One message exchanged with the signing authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgEnvelope {
    /// Routing and classification metadata.
    pub headers: Headers,
    /// Destination topic or queue.
    pub address: String,
    /// Payload, including the correlation identifier.
    pub body: Body,
}

impl MsgEnvelope {
    /// Create an envelope.
    #[must_use]
    pub fn new(headers: Headers, address: impl Into<String>, body: Body) -> Self {
        Self {
            headers,
            address: address.into(),
            body,
        }
    }

    /// The correlation identifier carried in the body, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.body.get(REQUEST_ID_FIELD).and_then(Value::as_str)
    }

    /// Serialize the body to its canonical text payload.
    pub fn body_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }
}

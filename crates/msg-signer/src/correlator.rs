//! # Correlator
//!
//! Receive path. Listens on the reply address and matches each reply to an
//! awaited correlation identifier, bounded by a per-attempt deadline.
//!
//! ## Receive Rules
//!
//! - A reply whose identifier is awaited is recorded and accepted.
//! - Any other reply is left unsettled, so the broker can redeliver it to
//!   another consumer.
//! - Once every identifier has arrived the receiver and connection close.
//! - When the deadline fires first the attempt closes with a single
//!   `MessagingTimeout` record. Replies received so far are kept.
//! - A connection that drops while replies are still missing ends the
//!   attempt with a `ConnectionError` record, so the next attempt resumes.

use crate::retry::{Attempt, RetryPolicy};
use async_trait::async_trait;
use serde_json::Value;
use sign_bus::{BrokerEndpoint, BusConnection, BusEvent, Delivery, MessageBus};
use sign_types::{ErrorRecord, Headers};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Object in a reply body that wraps the original request.
pub const REPLY_WRAPPER: &str = "msg";

/// Where the correlation identifier sits inside a reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyIdPath {
    segments: Vec<String>,
}

impl ReplyIdPath {
    /// `msg.<id_key>`, the layout the signing authority replies with.
    #[must_use]
    pub fn new(id_key: &str) -> Self {
        Self {
            segments: vec![REPLY_WRAPPER.to_string(), id_key.to_string()],
        }
    }

    /// A path given as dot-separated keys.
    #[must_use]
    pub fn from_dotted(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// The identifier at this path, when present and a string.
    #[must_use]
    pub fn extract<'v>(&self, body: &'v Value) -> Option<&'v str> {
        self.segments
            .iter()
            .try_fold(body, |value, key| value.get(key))
            .and_then(Value::as_str)
    }
}

/// One recorded reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Body text as delivered.
    pub body: String,
    /// Parsed body.
    pub payload: Value,
    pub headers: Headers,
}

/// What a receive call collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Receipt {
    /// Replies keyed by correlation identifier.
    pub replies: HashMap<String, Reply>,
    /// Records of every failed attempt; empty when an attempt succeeded.
    pub errors: Vec<ErrorRecord>,
}

impl Receipt {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

enum Step {
    Deadline,
    Event(Option<BusEvent>),
}

/// One receive call, resumable across attempts.
pub struct ReceiveRun<'a> {
    bus: &'a dyn MessageBus,
    endpoint: &'a BrokerEndpoint,
    address: &'a str,
    id_path: &'a ReplyIdPath,
    timeout: Duration,
    /// Awaited identifiers and whether each has arrived.
    awaited: HashMap<String, bool>,
    remaining: usize,
    replies: HashMap<String, Reply>,
}

impl<'a> ReceiveRun<'a> {
    pub fn new(
        bus: &'a dyn MessageBus,
        endpoint: &'a BrokerEndpoint,
        address: &'a str,
        id_path: &'a ReplyIdPath,
        timeout: Duration,
        awaited: HashSet<String>,
    ) -> Self {
        let remaining = awaited.len();
        Self {
            bus,
            endpoint,
            address,
            id_path,
            timeout,
            awaited: awaited.into_iter().map(|id| (id, false)).collect(),
            remaining,
            replies: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn into_replies(self) -> HashMap<String, Reply> {
        self.replies
    }

    /// Record an awaited reply. Returns `false` when the delivery must be
    /// left unsettled.
    fn record(&mut self, delivery: &Delivery) -> bool {
        let payload: Value = match serde_json::from_str(&delivery.body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(tag = delivery.tag, error = %e, "Ignored unparsable message");
                return false;
            }
        };
        let Some(id) = self.id_path.extract(&payload).map(str::to_string) else {
            debug!(tag = delivery.tag, "Ignored message without id");
            return false;
        };
        let Some(received) = self.awaited.get_mut(&id) else {
            debug!(request_id = %id, "Ignored message");
            return false;
        };

        if *received {
            debug!(request_id = %id, "Duplicate reply");
        } else {
            *received = true;
            self.remaining -= 1;
            debug!(request_id = %id, remaining = self.remaining, "Reply received");
            self.replies.insert(
                id,
                Reply {
                    body: delivery.body.clone(),
                    payload,
                    headers: delivery.properties.clone(),
                },
            );
        }
        true
    }

    async fn shutdown(conn: &mut dyn BusConnection) {
        conn.close_receiver().await;
        conn.close().await;
    }
}

#[async_trait]
impl Attempt for ReceiveRun<'_> {
    async fn run(&mut self, errors: &mut Vec<ErrorRecord>) {
        if self.is_complete() {
            return;
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut conn = match self
            .bus
            .connect(&self.endpoint.urls, &self.endpoint.tls)
            .await
        {
            Ok(conn) => conn,
            Err(fault) => {
                warn!(error = %fault, "Connection failed");
                errors.push(fault.to_record());
                return;
            }
        };

        if let Err(fault) = conn.open_receiver(self.address).await {
            warn!(address = %self.address, error = %fault, "Receiver could not be opened");
            errors.push(fault.to_record());
            conn.close().await;
            return;
        }

        loop {
            let step = tokio::select! {
                () = &mut deadline => Step::Deadline,
                event = conn.next_event() => Step::Event(event),
            };

            match step {
                Step::Deadline => {
                    warn!(
                        address = %self.address,
                        remaining = self.remaining,
                        timeout_secs = self.timeout.as_secs(),
                        "Timed out waiting for replies"
                    );
                    Self::shutdown(conn.as_mut()).await;
                    errors.push(ErrorRecord::messaging_timeout());
                    return;
                }
                Step::Event(None) | Step::Event(Some(BusEvent::Disconnected)) => {
                    if !self.is_complete() {
                        warn!(remaining = self.remaining, "Connection ended before all replies");
                        errors.push(ErrorRecord::disconnected(self.remaining));
                    }
                    break;
                }
                Step::Event(Some(BusEvent::Fault(fault))) => {
                    warn!(error = %fault, "Transport fault while receiving");
                    errors.push(fault.to_record());
                    break;
                }
                Step::Event(Some(BusEvent::Message(delivery))) => {
                    if self.record(&delivery) {
                        if let Err(fault) = conn.accept(delivery.tag).await {
                            warn!(error = %fault, "Accept failed");
                            errors.push(fault.to_record());
                            break;
                        }
                    }
                    if self.is_complete() {
                        debug!("All replies received");
                        break;
                    }
                }
                Step::Event(Some(BusEvent::Sendable | BusEvent::Accepted { .. })) => {}
            }
        }

        Self::shutdown(conn.as_mut()).await;
    }
}

/// Collects correlated replies from a [`MessageBus`].
pub struct Correlator {
    bus: Arc<dyn MessageBus>,
    endpoint: BrokerEndpoint,
    retry: RetryPolicy,
    id_path: ReplyIdPath,
    timeout: Duration,
}

impl Correlator {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        endpoint: BrokerEndpoint,
        retry: RetryPolicy,
        id_path: ReplyIdPath,
        timeout: Duration,
    ) -> Self {
        Self {
            bus,
            endpoint,
            retry,
            id_path,
            timeout,
        }
    }

    /// Wait on `address` for a reply to every identifier in `awaited`.
    ///
    /// Each attempt gets a fresh deadline and only waits for identifiers
    /// still missing. An empty set returns at once without connecting.
    pub async fn receive(&self, address: &str, awaited: HashSet<String>) -> Receipt {
        if awaited.is_empty() {
            debug!("No messages to receive");
            return Receipt::default();
        }

        debug!(address = %address, awaited = awaited.len(), "Waiting for replies");
        let mut run = ReceiveRun::new(
            self.bus.as_ref(),
            &self.endpoint,
            address,
            &self.id_path,
            self.timeout,
            awaited,
        );
        let errors = self.retry.run(&mut run).await.into_errors();

        Receipt {
            replies: run.into_replies(),
            errors,
        }
    }
}

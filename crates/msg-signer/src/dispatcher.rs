//! # Dispatcher
//!
//! Send path. Publishes a batch of envelopes in list order, one per credit,
//! and counts broker acknowledgments until every envelope is confirmed.
//!
//! ## Attempt State
//!
//! ```text
//!   Connecting ──► Sending ──(confirmed == total)──► Done
//!        │            │
//!        └── fault ───┴──► Failed (record appended, connection closed)
//! ```
//!
//! Progress survives across attempts: a retry never re-sends an envelope the
//! broker already confirmed. Envelopes sent but unconfirmed when an attempt
//! ends are sent again by the next one.

use crate::retry::{Attempt, RetryPolicy};
use async_trait::async_trait;
use sign_bus::{BrokerEndpoint, BusConnection, BusEvent, MessageBus, OutboundMessage};
use sign_types::{ErrorRecord, MsgEnvelope};
use std::sync::Arc;
use tracing::{debug, warn};

/// Send/confirm counters of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendProgress {
    pub sent: usize,
    pub confirmed: usize,
    pub total: usize,
}

impl SendProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            sent: 0,
            confirmed: 0,
            total,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.confirmed >= self.total
    }

    /// Forget sends the broker never confirmed.
    fn rewind(&mut self) {
        self.sent = self.confirmed;
    }
}

enum Flow {
    Continue,
    Stop,
}

/// One batch being sent, resumable across attempts.
pub struct SendRun<'a> {
    bus: &'a dyn MessageBus,
    endpoint: &'a BrokerEndpoint,
    messages: Vec<OutboundMessage>,
    progress: SendProgress,
}

impl<'a> SendRun<'a> {
    pub fn new(
        bus: &'a dyn MessageBus,
        endpoint: &'a BrokerEndpoint,
        messages: Vec<OutboundMessage>,
    ) -> Self {
        let progress = SendProgress::new(messages.len());
        Self {
            bus,
            endpoint,
            messages,
            progress,
        }
    }

    #[must_use]
    pub fn progress(&self) -> SendProgress {
        self.progress
    }

    async fn on_event(
        &mut self,
        conn: &mut dyn BusConnection,
        event: BusEvent,
        errors: &mut Vec<ErrorRecord>,
    ) -> Flow {
        match event {
            BusEvent::Sendable => {
                let Some(message) = self.messages.get(self.progress.sent) else {
                    return Flow::Continue;
                };
                if let Err(fault) = conn.send(message.clone()).await {
                    warn!(error = %fault, "Send failed");
                    errors.push(fault.to_record());
                    return Flow::Stop;
                }
                self.progress.sent += 1;
                debug!(
                    address = %message.address,
                    sent = self.progress.sent,
                    total = self.progress.total,
                    "Message sent"
                );
                Flow::Continue
            }
            BusEvent::Accepted { tag } => {
                self.progress.confirmed += 1;
                debug!(
                    tag = tag,
                    confirmed = self.progress.confirmed,
                    total = self.progress.total,
                    "Message confirmed"
                );
                if self.progress.is_complete() {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            }
            BusEvent::Disconnected => {
                debug!(
                    confirmed = self.progress.confirmed,
                    total = self.progress.total,
                    "Disconnected before all messages were confirmed"
                );
                self.progress.rewind();
                Flow::Stop
            }
            BusEvent::Fault(fault) => {
                warn!(error = %fault, "Transport fault while sending");
                errors.push(fault.to_record());
                Flow::Stop
            }
            BusEvent::Message(_) => Flow::Continue,
        }
    }
}

#[async_trait]
impl Attempt for SendRun<'_> {
    async fn run(&mut self, errors: &mut Vec<ErrorRecord>) {
        if self.progress.is_complete() {
            return;
        }
        self.progress.rewind();

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

        if let Err(fault) = conn.open_sender().await {
            warn!(error = %fault, "Sender could not be opened");
            errors.push(fault.to_record());
            conn.close().await;
            return;
        }

        while let Some(event) = conn.next_event().await {
            if let Flow::Stop = self.on_event(conn.as_mut(), event, errors).await {
                break;
            }
        }
        conn.close().await;
    }
}

/// Sends envelope batches through a [`MessageBus`].
pub struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    endpoint: BrokerEndpoint,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn MessageBus>, endpoint: BrokerEndpoint, retry: RetryPolicy) -> Self {
        Self {
            bus,
            endpoint,
            retry,
        }
    }

    /// Send every envelope, retrying within the attempt budget.
    ///
    /// Returns the error records of every failed attempt, or nothing once an
    /// attempt completes cleanly. An empty batch never connects.
    pub async fn send(&self, envelopes: &[MsgEnvelope]) -> Vec<ErrorRecord> {
        if envelopes.is_empty() {
            debug!("No messages to send");
            return Vec::new();
        }

        let mut messages = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            match to_outbound(envelope) {
                Ok(message) => messages.push(message),
                Err(record) => return vec![record],
            }
        }

        debug!(count = messages.len(), "Sending messages");
        let mut run = SendRun::new(self.bus.as_ref(), &self.endpoint, messages);
        let outcome = self.retry.run(&mut run).await;
        outcome.into_errors()
    }
}

/// Body as canonical JSON text, headers as message properties.
fn to_outbound(envelope: &MsgEnvelope) -> Result<OutboundMessage, ErrorRecord> {
    let body = envelope
        .body_text()
        .map_err(|e| ErrorRecord::encoding(e.to_string()))?;
    Ok(OutboundMessage {
        address: envelope.address.clone(),
        properties: envelope.headers.clone(),
        body,
    })
}

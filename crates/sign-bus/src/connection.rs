//! # In-Memory Connection
//!
//! Connection side of [`InMemoryBroker`](crate::InMemoryBroker). Sends are
//! acknowledged immediately, one credit is granted after the sender opens and
//! after every send, and deliveries stay unsettled until accepted.

use crate::broker::Shared;
use crate::transport::{
    BusConnection, BusEvent, Delivery, FaultKind, OutboundMessage, TransportFault,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// A connection to an [`InMemoryBroker`](crate::InMemoryBroker).
pub struct InMemoryConnection {
    shared: Arc<Shared>,
    /// Events waiting to be handed out, in order.
    pending: VecDeque<BusEvent>,
    sender_open: bool,
    /// Whether a `Sendable` event is owed to the sender.
    credit: bool,
    sends: usize,
    /// Scripted fault raised once `sends` reaches the threshold.
    fault_after: Option<(usize, TransportFault)>,
    receiver: Option<String>,
    unsettled: BTreeMap<u64, Delivery>,
    closed: bool,
}

impl InMemoryConnection {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            pending: VecDeque::new(),
            sender_open: false,
            credit: false,
            sends: 0,
            fault_after: None,
            receiver: None,
            unsettled: BTreeMap::new(),
            closed: false,
        }
    }

    pub(crate) fn with_fault_after(mut self, sends: usize, fault: TransportFault) -> Self {
        if sends == 0 {
            self.pending.push_back(BusEvent::Fault(fault));
        } else {
            self.fault_after = Some((sends, fault));
        }
        self
    }

    pub(crate) fn disconnected(mut self) -> Self {
        self.pending.push_back(BusEvent::Disconnected);
        self
    }

    /// Next event available without waiting.
    fn poll_event(&mut self) -> Option<BusEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.sender_open && self.credit {
            self.credit = false;
            return Some(BusEvent::Sendable);
        }
        let address = self.receiver.as_deref()?;
        let delivery = self.shared.pop(address)?;
        self.unsettled.insert(delivery.tag, delivery.clone());
        Some(BusEvent::Message(delivery))
    }

    fn release_unsettled(&mut self) {
        let released = std::mem::take(&mut self.unsettled).into_values().collect();
        self.shared.release(released);
    }

    fn ensure_open(&self) -> Result<(), TransportFault> {
        if self.closed {
            return Err(TransportFault::new(
                FaultKind::Connection,
                "connection is closed",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BusConnection for InMemoryConnection {
    async fn open_sender(&mut self) -> Result<(), TransportFault> {
        self.ensure_open()?;
        self.sender_open = true;
        self.credit = true;
        Ok(())
    }

    async fn open_receiver(&mut self, address: &str) -> Result<(), TransportFault> {
        self.ensure_open()?;
        debug!(address = address, "Receiver opened");
        self.receiver = Some(address.to_string());
        Ok(())
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<(), TransportFault> {
        self.ensure_open()?;
        if !self.sender_open {
            return Err(TransportFault::new(FaultKind::Link, "sender is not open"));
        }

        let tag = self.shared.publish(message);
        self.sends += 1;
        self.pending.push_back(BusEvent::Accepted { tag });

        match self.fault_after.take() {
            Some((threshold, fault)) if self.sends >= threshold => {
                self.pending.push_back(BusEvent::Fault(fault));
            }
            other => {
                self.fault_after = other;
                self.credit = true;
            }
        }
        Ok(())
    }

    async fn accept(&mut self, tag: u64) -> Result<(), TransportFault> {
        self.ensure_open()?;
        if self.unsettled.remove(&tag).is_none() {
            return Err(TransportFault::new(
                FaultKind::Session,
                format!("unknown delivery tag {tag}"),
            ));
        }
        self.shared.record_accept();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<BusEvent> {
        loop {
            // Register interest before polling so a publish between the poll
            // and the await is not missed.
            let shared = self.shared.clone();
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.poll_event() {
                return Some(event);
            }
            if self.closed {
                return None;
            }
            notified.await;
        }
    }

    async fn close_receiver(&mut self) {
        self.release_unsettled();
        self.receiver = None;
    }

    async fn close(&mut self) {
        self.release_unsettled();
        self.receiver = None;
        self.sender_open = false;
        self.credit = false;
        self.pending.clear();
        self.closed = true;
        debug!("Connection closed");
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.release_unsettled();
    }
}

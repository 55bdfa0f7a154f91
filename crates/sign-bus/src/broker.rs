//! # In-Memory Broker
//!
//! A single-process implementation of [`MessageBus`] with one FIFO queue per
//! address. Suitable for tests and for embedding the engine next to an
//! in-process signing authority; production deployments plug in a real
//! messaging client behind the same trait.

use crate::connection::InMemoryConnection;
use crate::transport::{
    BusConnection, Delivery, MessageBus, OutboundMessage, TlsSettings, TransportFault,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Produces replies for messages published to an address.
pub type Responder = Arc<dyn Fn(&Delivery) -> Vec<OutboundMessage> + Send + Sync>;

/// Scripted behavior for the next connection opened on the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionPlan {
    /// The connection behaves normally.
    Healthy,
    /// `connect` fails with the fault.
    Refuse(TransportFault),
    /// The connection opens, then reports the fault as its first event.
    FailAfterConnect(TransportFault),
    /// The connection reports the fault after `sends` messages were sent.
    FailAfterSends {
        sends: usize,
        fault: TransportFault,
    },
    /// The connection drops before delivering any other event.
    Disconnect,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Delivery>>,
    responders: HashMap<String, Responder>,
    plans: VecDeque<ConnectionPlan>,
    next_tag: u64,
}

/// State shared between the broker handle and its connections.
pub(crate) struct Shared {
    state: Mutex<BrokerState>,
    /// Woken on every publish and release.
    pub(crate) notify: Notify,
    connections_opened: AtomicU64,
    published: AtomicU64,
    accepted: AtomicU64,
}

impl Shared {
    /// Publish a message, run the address responder, and queue the message
    /// when no responder consumes it.
    pub(crate) fn publish(&self, message: OutboundMessage) -> u64 {
        let (delivery, responder) = {
            let mut state = self.state.lock();
            state.next_tag += 1;
            let delivery = Delivery {
                tag: state.next_tag,
                address: message.address,
                properties: message.properties,
                body: message.body,
            };
            let responder = state.responders.get(&delivery.address).cloned();
            if responder.is_none() {
                state
                    .queues
                    .entry(delivery.address.clone())
                    .or_default()
                    .push_back(delivery.clone());
            }
            (delivery, responder)
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(address = %delivery.address, tag = delivery.tag, "Message published");

        if let Some(responder) = responder {
            for reply in responder(&delivery) {
                self.publish(reply);
            }
        }

        self.notify.notify_waiters();
        delivery.tag
    }

    pub(crate) fn pop(&self, address: &str) -> Option<Delivery> {
        self.state
            .lock()
            .queues
            .get_mut(address)
            .and_then(VecDeque::pop_front)
    }

    /// Return unsettled deliveries to the front of their queues, preserving
    /// their original order.
    pub(crate) fn release(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock();
            for delivery in deliveries.into_iter().rev() {
                debug!(address = %delivery.address, tag = delivery.tag, "Delivery released");
                state
                    .queues
                    .entry(delivery.address.clone())
                    .or_default()
                    .push_front(delivery);
            }
        }
        self.notify.notify_waiters();
    }

    pub(crate) fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory message broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                connections_opened: AtomicU64::new(0),
                published: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
            }),
        }
    }

    /// Consume every message published to `address` with `responder`,
    /// publishing whatever it returns.
    pub fn respond_on<F>(&self, address: impl Into<String>, responder: F)
    where
        F: Fn(&Delivery) -> Vec<OutboundMessage> + Send + Sync + 'static,
    {
        self.shared
            .state
            .lock()
            .responders
            .insert(address.into(), Arc::new(responder));
    }

    /// Publish a message directly, bypassing any connection.
    pub fn publish(&self, message: OutboundMessage) -> u64 {
        self.shared.publish(message)
    }

    /// Script the behavior of the next connection. Plans are consumed in
    /// order, one per `connect`.
    pub fn plan_connection(&self, plan: ConnectionPlan) {
        self.shared.state.lock().plans.push_back(plan);
    }

    /// Messages waiting on `address`.
    #[must_use]
    pub fn queued(&self, address: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(address)
            .map_or(0, VecDeque::len)
    }

    /// Drain and return the messages waiting on `address`.
    pub fn drain(&self, address: &str) -> Vec<Delivery> {
        self.shared
            .state
            .lock()
            .queues
            .remove(address)
            .map(Vec::from)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.shared.connections_opened.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn deliveries_accepted(&self) -> u64 {
        self.shared.accepted.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBroker {
    async fn connect(
        &self,
        urls: &[String],
        _tls: &TlsSettings,
    ) -> Result<Box<dyn BusConnection>, TransportFault> {
        self.shared.connections_opened.fetch_add(1, Ordering::Relaxed);
        let plan = self.shared.state.lock().plans.pop_front();

        let connection = InMemoryConnection::new(self.shared.clone());
        let connection = match plan {
            None | Some(ConnectionPlan::Healthy) => connection,
            Some(ConnectionPlan::Refuse(fault)) => {
                warn!(urls = ?urls, error = %fault, "Connection refused");
                return Err(fault);
            }
            Some(ConnectionPlan::FailAfterConnect(fault)) => connection.with_fault_after(0, fault),
            Some(ConnectionPlan::FailAfterSends { sends, fault }) => {
                connection.with_fault_after(sends, fault)
            }
            Some(ConnectionPlan::Disconnect) => connection.disconnected(),
        };

        let secure = !urls.is_empty() && urls.iter().all(|url| crate::is_secure_url(url));
        debug!(urls = ?urls, secure = secure, "Connection opened");
        Ok(Box::new(connection))
    }
}

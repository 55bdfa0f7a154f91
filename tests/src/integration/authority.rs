//! In-process signing authority and signer fixtures.

use msg_signer::{MsgSigner, MsgSignerConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sign_bus::{Delivery, InMemoryBroker, OutboundMessage};
use std::sync::Arc;

/// Address requests are published to.
pub const SEND_TO: &str = "topic://Topic.sign";

/// Requester identity of every test signer.
pub const CREATOR: &str = "msg-sign";

/// Signer configuration with the given attempt budget and receive deadline.
pub fn config(retries: u32, timeout_secs: u64) -> MsgSignerConfig {
    let content = format!(
        r#"
[msg_signer]
messaging_brokers = ["amqps://broker-01:5671"]
messaging_cert = "/etc/msg-sign/cert.crt"
messaging_ca_cert = "/etc/msg-sign/ca_cert.crt"
topic_send_to = "{SEND_TO}"
topic_listen_to = "queue://Consumer.{{creator}}.{{task_id}}.Topic.sign.{{task_id}}"
creator = "{CREATOR}"
environment = "test"
service = "msg-sign"
timeout = {timeout_secs}
retries = {retries}
message_id_key = "request_id"
"#
    );
    MsgSignerConfig::from_toml(&content).expect("valid test configuration")
}

pub fn signer(broker: &InMemoryBroker, retries: u32, timeout_secs: u64) -> MsgSigner {
    MsgSigner::new(config(retries, timeout_secs), Arc::new(broker.clone()))
}

/// Reply queue of a task.
pub fn reply_queue(task_id: &str) -> String {
    format!("queue://Consumer.{CREATOR}.{task_id}.Topic.sign.{task_id}")
}

/// The reply the authority sends for a request: the request body wrapped in
/// `msg`, plus the signed data.
pub fn reply_for(request: &Delivery) -> OutboundMessage {
    let body: Value = serde_json::from_str(&request.body).expect("request body is JSON");
    let task_id = body["pub_task_id"].as_str().unwrap_or_default().to_string();
    let data = body["claim_file"].as_str().unwrap_or_default().to_string();
    OutboundMessage {
        address: reply_queue(&task_id),
        properties: request.properties.clone(),
        body: json!({
            "msg": body,
            "signed_claim": format!("signed:{data}"),
        })
        .to_string(),
    }
}

/// Signed data carried by a result slot.
pub fn signed_claim(slot: &str) -> String {
    let reply: Value = serde_json::from_str(slot).expect("slot holds a reply body");
    reply["signed_claim"]
        .as_str()
        .expect("reply carries signed_claim")
        .to_string()
}

/// Answer every request as soon as it is published.
pub fn install_echo(broker: &InMemoryBroker) {
    broker.respond_on(SEND_TO, |request| vec![reply_for(request)]);
}

/// Hold replies until `batch` requests arrived, then release them in
/// reverse order.
pub fn install_reversed(broker: &InMemoryBroker, batch: usize) {
    let held: Arc<Mutex<Vec<OutboundMessage>>> = Arc::new(Mutex::new(Vec::new()));
    broker.respond_on(SEND_TO, move |request| {
        let mut held = held.lock();
        held.push(reply_for(request));
        if held.len() < batch {
            return Vec::new();
        }
        held.drain(..).rev().collect()
    });
}

/// Answer only the requests whose zero-based arrival index passes `answer`.
pub fn install_selective<F>(broker: &InMemoryBroker, answer: F)
where
    F: Fn(usize) -> bool + Send + Sync + 'static,
{
    let seen = Arc::new(Mutex::new(0usize));
    broker.respond_on(SEND_TO, move |request| {
        let mut seen = seen.lock();
        let index = *seen;
        *seen += 1;
        if answer(index) {
            vec![reply_for(request)]
        } else {
            Vec::new()
        }
    });
}

/// Record the requests without answering them.
pub fn install_recorder(broker: &InMemoryBroker) -> Arc<Mutex<Vec<Delivery>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    broker.respond_on(SEND_TO, move |request| {
        sink.lock().push(request.clone());
        Vec::new()
    });
    seen
}

//! # Message Signer
//!
//! Turns one signing operation into a dispatch, await and fold cycle.
//!
//! ```text
//!   Build ──► Dispatch ──► Await ──► Fold ──► ok
//!                │            │
//!                └────────────┴──► error (joined records, empty results)
//! ```
//!
//! Transport problems never escape `sign()`: they end up in the outcome's
//! error message. Only operation validation fails early, and that happens
//! when the operation is constructed.

use crate::config::MsgSignerConfig;
use crate::correlator::{Correlator, Reply, ReplyIdPath};
use crate::dispatcher::Dispatcher;
use chrono::Utc;
use serde_json::{json, Value};
use sign_bus::MessageBus;
use sign_types::{
    create_manifest_claim, Body, ClearSignOperation, ContainerSignOperation, ErrorRecord, Headers,
    MsgEnvelope, OperationKind, SignOperation, SignResult, SignerResults, SigningOutcome,
    REQUEST_ID_FIELD,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Value of the `source` header on every request.
pub const MESSAGE_SOURCE: &str = "metadata";

/// Extra attribute carrying the task id in both headers and body.
pub const TASK_ID_ATTR: &str = "pub_task_id";

/// Signs through a remote signing authority reached over a message bus.
pub struct MsgSigner {
    config: MsgSignerConfig,
    bus: Arc<dyn MessageBus>,
    span: Span,
}

impl MsgSigner {
    pub fn new(config: MsgSignerConfig, bus: Arc<dyn MessageBus>) -> Self {
        let span = info_span!(
            "msg_signer",
            requester = %config.creator,
            service = %config.service,
            environment = %config.environment,
        );
        Self { config, bus, span }
    }

    #[must_use]
    pub fn config(&self) -> &MsgSignerConfig {
        &self.config
    }

    /// Identity recorded as the requester of every outcome.
    #[must_use]
    pub fn requester(&self) -> &str {
        &self.config.creator
    }

    #[must_use]
    pub fn supported_kinds(&self) -> &'static [OperationKind] {
        SignOperation::supported_kinds()
    }

    pub async fn clear_sign(&self, operation: ClearSignOperation) -> SigningOutcome {
        self.sign(&operation.into()).await
    }

    pub async fn container_sign(&self, operation: ContainerSignOperation) -> SigningOutcome {
        self.sign(&operation.into()).await
    }

    /// Run one signing operation to completion.
    pub async fn sign(&self, operation: &SignOperation) -> SigningOutcome {
        self.run(operation).instrument(self.span.clone()).await
    }

    async fn run(&self, operation: &SignOperation) -> SigningOutcome {
        let envelopes = self.build_envelopes(operation);
        debug!(
            kind = operation.kind().as_str(),
            task_id = operation.task_id(),
            count = envelopes.len(),
            "Messages to send"
        );

        let endpoint = self.config.endpoint();
        let retry = self.config.retry_policy();

        let dispatcher = Dispatcher::new(self.bus.clone(), endpoint.clone(), retry);
        let errors = dispatcher.send(&envelopes).await;
        if !errors.is_empty() {
            return self.failed(operation, &errors);
        }

        let positions: HashMap<String, usize> = envelopes
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.request_id().map(|id| (id.to_string(), i)))
            .collect();

        let reply_address = self
            .config
            .topic_listen_to
            .render(&self.config.address_fields(operation));
        let correlator = Correlator::new(
            self.bus.clone(),
            endpoint,
            retry,
            ReplyIdPath::new(&self.config.message_id_key),
            self.config.timeout,
        );
        let receipt = correlator
            .receive(&reply_address, positions.keys().cloned().collect())
            .await;
        if !receipt.is_ok() {
            return self.failed(operation, &receipt.errors);
        }

        let mut result = operation.empty_result();
        fold_replies(&mut result, &positions, receipt.replies);

        info!(
            kind = operation.kind().as_str(),
            task_id = operation.task_id(),
            "Signing finished"
        );
        SigningOutcome::new(
            self.requester(),
            operation.clone(),
            SignerResults::ok(),
            result,
        )
    }

    fn failed(&self, operation: &SignOperation, errors: &[ErrorRecord]) -> SigningOutcome {
        warn!(
            kind = operation.kind().as_str(),
            task_id = operation.task_id(),
            errors = errors.len(),
            "Signing failed"
        );
        SigningOutcome::new(
            self.requester(),
            operation.clone(),
            SignerResults::failed(errors),
            operation.empty_result(),
        )
    }

    /// One envelope per unit of work, in input order, each with a fresh
    /// correlation identifier.
    #[must_use]
    pub fn build_envelopes(&self, operation: &SignOperation) -> Vec<MsgEnvelope> {
        let kind = operation.kind();
        match operation {
            SignOperation::ClearSign(op) => op
                .inputs()
                .iter()
                .map(|input| self.envelope(operation, kind, input))
                .collect(),
            SignOperation::ContainerSign(op) => op
                .pairs()
                .map(|(digest, reference)| {
                    let claim = create_manifest_claim(digest, reference);
                    self.envelope(operation, kind, &claim)
                })
                .collect(),
        }
    }

    fn envelope(&self, operation: &SignOperation, kind: OperationKind, data: &str) -> MsgEnvelope {
        let task_id = Value::from(operation.task_id());

        let mut headers = Headers::new();
        headers.insert("service".into(), json!(self.config.service));
        headers.insert("environment".into(), json!(self.config.environment));
        headers.insert("owner_id".into(), json!(self.config.creator));
        headers.insert("mtype".into(), json!(kind.message_type()));
        headers.insert("source".into(), json!(MESSAGE_SOURCE));
        headers.insert(TASK_ID_ATTR.into(), task_id.clone());

        let request_id = Uuid::new_v4().to_string();
        let mut body = Body::new();
        body.insert("sig_key_id".into(), json!(operation.signing_key()));
        body.insert("claim_file".into(), json!(data));
        body.insert(REQUEST_ID_FIELD.into(), json!(request_id));
        body.insert("created".into(), json!(isodate_now()));
        body.insert("requested_by".into(), json!(self.config.creator));
        body.insert(TASK_ID_ATTR.into(), task_id);

        let address = self
            .config
            .topic_send_to
            .render(&self.config.address_fields(operation));
        debug!(request_id = %request_id, address = %address, "Constructed message");

        MsgEnvelope::new(headers, address, body)
    }
}

/// Place each reply body at the position of the request it answers. Reply
/// headers are dropped.
fn fold_replies(
    result: &mut SignResult,
    positions: &HashMap<String, usize>,
    replies: HashMap<String, Reply>,
) {
    let slots = result.slots_mut();
    for (id, reply) in replies {
        if let Some(slot) = positions.get(&id).and_then(|&i| slots.get_mut(i)) {
            *slot = reply.body;
        }
    }
}

/// Current UTC time, ISO-8601 with microseconds and a `Z` suffix.
fn isodate_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

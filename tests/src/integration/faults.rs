//! # Fault Handling
//!
//! Transport faults, receive timeouts and retries as seen by the caller of
//! `sign()`: every failure becomes an error outcome, never a panic.

#[cfg(test)]
mod tests {
    use crate::integration::authority::{
        install_echo, install_selective, reply_for, reply_queue, signed_claim, signer, SEND_TO,
    };
    use msg_signer::{Correlator, Dispatcher, ReplyIdPath, RetryPolicy};
    use sign_bus::{
        BrokerEndpoint, ConnectionPlan, FaultKind, InMemoryBroker, OutboundMessage, TransportFault,
    };
    use sign_types::{
        ClearSignOperation, ContainerSignOperation, ErrorRecord, Headers, SignerStatus,
    };
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT_LINE: &str = "MessagingTimeout : Out of time when receiving messages\n";

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn container_operation() -> ContainerSignOperation {
        ContainerSignOperation::new(
            strings(&["sha256:aaa", "sha256:bbb"]),
            strings(&["registry/repo:1", "registry/repo:2"]),
            "abcd1234",
            "1",
        )
        .unwrap()
    }

    // =============================================================================
    // SEND PATH
    // =============================================================================

    #[tokio::test]
    async fn test_send_fault_yields_error_outcome() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        broker.plan_connection(ConnectionPlan::FailAfterConnect(TransportFault::new(
            FaultKind::Transport,
            "test error description",
        )));

        let outcome = signer(&broker, 1, 5)
            .container_sign(container_operation())
            .await;

        assert_eq!(outcome.status(), SignerStatus::Error);
        assert_eq!(
            outcome.error_message(),
            "TransportError : test error description\n"
        );
        assert_eq!(outcome.result().slots(), &["", ""]);
        assert_eq!(outcome.result().signing_key(), "abcd1234");
        // Nothing was awaited after the failed send.
        assert_eq!(broker.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_send_retry_recovers() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        broker.plan_connection(ConnectionPlan::Refuse(TransportFault::new(
            FaultKind::Connection,
            "amqp:connection:forced",
        )));

        let outcome = signer(&broker, 2, 5)
            .container_sign(container_operation())
            .await;

        assert!(outcome.is_ok());
        assert!(outcome
            .result()
            .slots()
            .iter()
            .all(|slot| signed_claim(slot).starts_with("signed:")));
    }

    #[tokio::test]
    async fn test_send_resumes_without_duplicates() {
        let broker = InMemoryBroker::new();
        broker.plan_connection(ConnectionPlan::FailAfterSends {
            sends: 2,
            fault: TransportFault::new(FaultKind::Link, "amqp:link:detach-forced"),
        });

        let dispatcher = Dispatcher::new(
            Arc::new(broker.clone()),
            BrokerEndpoint::default(),
            RetryPolicy::new(3),
        );
        let envelopes = signer(&broker, 1, 1).build_envelopes(
            &ClearSignOperation::new(strings(&["a", "b", "c"]), "abcd1234", "2").into(),
        );

        let errors = dispatcher.send(&envelopes).await;
        assert!(errors.is_empty());

        let delivered = broker.drain(SEND_TO);
        let ids: Vec<_> = delivered
            .iter()
            .map(|d| {
                let body: serde_json::Value = serde_json::from_str(&d.body).unwrap();
                body["request_id"].as_str().unwrap().to_string()
            })
            .collect();
        let expected: Vec<_> = envelopes
            .iter()
            .map(|e| e.request_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_send_exhaustion_joins_all_records() {
        let broker = InMemoryBroker::new();
        for attempt in 1..=3 {
            broker.plan_connection(ConnectionPlan::Refuse(TransportFault::new(
                FaultKind::Connection,
                format!("refused {attempt}"),
            )));
        }

        let outcome = signer(&broker, 3, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "3"))
            .await;

        assert_eq!(
            outcome.error_message(),
            "ConnectionError : refused 1\nConnectionError : refused 2\nConnectionError : refused 3\n"
        );
    }

    // =============================================================================
    // RECEIVE PATH
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_silent_authority_times_out_once_per_attempt() {
        let broker = InMemoryBroker::new();
        let started = tokio::time::Instant::now();

        let outcome = signer(&broker, 1, 30)
            .clear_sign(ClearSignOperation::new(strings(&["x", "y"]), "abcd1234", "4"))
            .await;

        assert_eq!(outcome.error_message(), TIMEOUT_LINE);
        assert_eq!(outcome.result().slots(), &["", ""]);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_replies_are_an_error_outcome() {
        let broker = InMemoryBroker::new();
        install_selective(&broker, |index| index != 1);

        let outcome = signer(&broker, 1, 5)
            .clear_sign(ClearSignOperation::new(
                strings(&["a", "b", "c"]),
                "abcd1234",
                "5",
            ))
            .await;

        assert!(!outcome.is_ok());
        assert_eq!(outcome.error_message(), TIMEOUT_LINE);
        assert_eq!(outcome.result().slots(), &["", "", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlator_keeps_partial_replies_on_timeout() {
        let broker = InMemoryBroker::new();
        let config = crate::integration::authority::config(1, 5);
        let envelopes = signer(&broker, 1, 5).build_envelopes(
            &ClearSignOperation::new(strings(&["a", "b"]), "abcd1234", "6").into(),
        );
        let first = envelopes[0].request_id().unwrap().to_string();
        let second = envelopes[1].request_id().unwrap().to_string();

        // Only the first request is answered.
        broker.publish(reply_for(&sign_bus::Delivery {
            tag: 0,
            address: SEND_TO.into(),
            properties: Headers::new(),
            body: envelopes[0].body_text().unwrap(),
        }));

        let correlator = Correlator::new(
            Arc::new(broker.clone()),
            config.endpoint(),
            config.retry_policy(),
            ReplyIdPath::new(&config.message_id_key),
            config.timeout,
        );
        let receipt = correlator
            .receive(&reply_queue("6"), HashSet::from([first.clone(), second.clone()]))
            .await;

        assert_eq!(receipt.errors, vec![ErrorRecord::messaging_timeout()]);
        assert!(receipt.replies.contains_key(&first));
        assert!(!receipt.replies.contains_key(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_fault_then_recovery() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        broker.plan_connection(ConnectionPlan::Healthy);
        broker.plan_connection(ConnectionPlan::FailAfterConnect(TransportFault::new(
            FaultKind::Session,
            "amqp:session:unattached-handle",
        )));

        let outcome = signer(&broker, 2, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "7"))
            .await;

        assert!(outcome.is_ok());
        assert_eq!(signed_claim(&outcome.result().slots()[0]), "signed:x");
        // Send, failed receive, successful receive.
        assert_eq!(broker.connections_opened(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_disconnect_yields_error_outcome() {
        let broker = InMemoryBroker::new();
        broker.plan_connection(ConnectionPlan::Healthy);
        broker.plan_connection(ConnectionPlan::Disconnect);

        let outcome = signer(&broker, 1, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "10"))
            .await;

        assert_eq!(outcome.status(), SignerStatus::Error);
        assert_eq!(
            outcome.error_message(),
            "ConnectionError : Disconnected before all replies arrived (1 missing)\n"
        );
        assert_eq!(outcome.result().slots(), &[""]);
        assert_eq!(broker.connections_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_disconnect_then_recovery() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        broker.plan_connection(ConnectionPlan::Healthy);
        broker.plan_connection(ConnectionPlan::Disconnect);

        let outcome = signer(&broker, 2, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "11"))
            .await;

        assert!(outcome.is_ok());
        assert_eq!(signed_claim(&outcome.result().slots()[0]), "signed:x");
        // Send, dropped receive, successful receive.
        assert_eq!(broker.connections_opened(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_replies_stay_queued() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        let queue = reply_queue("8");
        broker.publish(OutboundMessage {
            address: queue.clone(),
            properties: Headers::new(),
            body: serde_json::json!({"msg": {"request_id": "not-ours"}}).to_string(),
        });

        let outcome = signer(&broker, 1, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "8"))
            .await;

        assert!(outcome.is_ok());
        let left = broker.drain(&queue);
        assert_eq!(left.len(), 1);
        assert!(left[0].body.contains("not-ours"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_send_surfaces_as_timeout() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);
        broker.plan_connection(ConnectionPlan::Disconnect);

        let outcome = signer(&broker, 1, 5)
            .clear_sign(ClearSignOperation::new(strings(&["x"]), "abcd1234", "9"))
            .await;

        // The dropped connection adds no record of its own; the missing reply
        // is what the caller sees.
        assert_eq!(outcome.error_message(), TIMEOUT_LINE);
        assert_eq!(broker.messages_published(), 0);
    }
}

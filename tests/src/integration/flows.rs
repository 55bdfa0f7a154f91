//! # Signing Flows
//!
//! Full build, dispatch, await and fold cycles against a responsive signing
//! authority.

#[cfg(test)]
mod tests {
    use crate::integration::authority::{
        install_echo, install_recorder, install_reversed, reply_for, reply_queue, signed_claim,
        signer, CREATOR, SEND_TO,
    };
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use msg_signer::{clear_sign_with_config, AutomationResponse};
    use serde_json::Value;
    use sign_bus::InMemoryBroker;
    use sign_types::{
        create_manifest_claim, ClearSignOperation, ContainerSignOperation, OperationError,
        SignOperation, SignResult, SignerStatus,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    // =============================================================================
    // ROUND TRIP
    // =============================================================================

    #[tokio::test]
    async fn test_clear_sign_hello_world() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);

        let outcome = signer(&broker, 3, 5)
            .clear_sign(ClearSignOperation::new(strings(&["hello world"]), "abcd1234", "1"))
            .await;

        assert_eq!(outcome.status(), SignerStatus::Ok);
        assert_eq!(outcome.error_message(), "");
        assert_eq!(outcome.requester(), CREATOR);
        match outcome.result() {
            SignResult::ClearSign(result) => {
                assert_eq!(result.outputs.len(), 1);
                assert_eq!(signed_claim(&result.outputs[0]), "signed:hello world");
                assert_eq!(result.signing_key, "abcd1234");
            }
            other => panic!("Expected clear sign result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_request_id_answered() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);

        let operation: SignOperation =
            ClearSignOperation::new(strings(&["a", "b", "c", "d"]), "abcd1234", "2").into();
        let outcome = signer(&broker, 1, 5).sign(&operation).await;

        assert!(outcome.is_ok());
        let answered: HashSet<String> = outcome
            .result()
            .slots()
            .iter()
            .map(|slot| {
                let reply: Value = serde_json::from_str(slot).unwrap();
                reply["msg"]["request_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(answered.len(), 4);
        assert_eq!(broker.deliveries_accepted(), 4);
        assert_eq!(broker.queued(&reply_queue("2")), 0);
    }

    #[tokio::test]
    async fn test_container_sign_claims_in_order() {
        let broker = InMemoryBroker::new();
        install_echo(&broker);

        let outcome = signer(&broker, 3, 5)
            .container_sign(
                ContainerSignOperation::new(
                    strings(&["sha256:aaa", "sha256:bbb"]),
                    strings(&["registry/repo:1", "registry/repo:2"]),
                    "abcd1234",
                    "3",
                )
                .unwrap(),
            )
            .await;

        assert!(outcome.is_ok());
        let claims = outcome.result().slots();
        assert_eq!(
            signed_claim(&claims[0]),
            format!("signed:{}", create_manifest_claim("sha256:aaa", "registry/repo:1"))
        );
        assert_eq!(
            signed_claim(&claims[1]),
            format!("signed:{}", create_manifest_claim("sha256:bbb", "registry/repo:2"))
        );
    }

    // =============================================================================
    // ORDERING
    // =============================================================================

    #[tokio::test]
    async fn test_outputs_follow_input_order_not_arrival_order() {
        let broker = InMemoryBroker::new();
        install_reversed(&broker, 5);

        let inputs = strings(&["one", "two", "three", "four", "five"]);
        let outcome = signer(&broker, 1, 5)
            .clear_sign(ClearSignOperation::new(inputs.clone(), "abcd1234", "4"))
            .await;

        assert!(outcome.is_ok());
        let outputs: Vec<_> = outcome.result().slots().iter().map(|s| signed_claim(s)).collect();
        let expected: Vec<_> = inputs.iter().map(|i| format!("signed:{i}")).collect();
        assert_eq!(outputs, expected);
    }

    // =============================================================================
    // REQUEST SHAPE
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_requests_carry_routing_headers() {
        let broker = InMemoryBroker::new();
        let seen = install_recorder(&broker);

        let outcome = signer(&broker, 1, 1)
            .container_sign(
                ContainerSignOperation::new(
                    strings(&["sha256:aaa"]),
                    strings(&["registry/repo:1"]),
                    "abcd1234",
                    "5",
                )
                .unwrap(),
            )
            .await;
        assert!(!outcome.is_ok());

        let requests = seen.lock();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.address, SEND_TO);
        assert_eq!(request.properties["mtype"], "container_signature");
        assert_eq!(request.properties["environment"], "test");
        assert_eq!(request.properties["pub_task_id"], "5");

        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["sig_key_id"], "abcd1234");
        assert_eq!(body["requested_by"], CREATOR);
        let claim = STANDARD
            .decode(body["claim_file"].as_str().unwrap())
            .unwrap();
        let claim: Value = serde_json::from_slice(&claim).unwrap();
        assert_eq!(
            claim["critical"]["identity"]["docker-reference"],
            "registry/repo:1"
        );
    }

    #[test]
    fn test_request_ids_unique_within_batch() {
        let broker = InMemoryBroker::new();
        let operation: SignOperation =
            ClearSignOperation::new(vec!["same".to_string(); 50], "abcd1234", "6").into();
        let envelopes = signer(&broker, 1, 1).build_envelopes(&operation);

        let ids: HashSet<_> = envelopes.iter().filter_map(|e| e.request_id()).collect();
        assert_eq!(ids.len(), 50);
    }

    // =============================================================================
    // VALIDATION
    // =============================================================================

    #[test]
    fn test_mismatched_container_pairs_fail_fast() {
        let result = ContainerSignOperation::new(
            strings(&["d1", "d2"]),
            strings(&["r1"]),
            "abcd1234",
            "7",
        );
        assert_eq!(
            result,
            Err(OperationError::MismatchedPairs {
                digests: 2,
                references: 1
            })
        );
    }

    #[test]
    fn test_manifest_claim_is_deterministic() {
        assert_eq!(
            create_manifest_claim("sha256:aaa", "registry/repo:1"),
            create_manifest_claim("sha256:aaa", "registry/repo:1")
        );
    }

    // =============================================================================
    // PROCESS-LEVEL HELPERS
    // =============================================================================

    #[tokio::test]
    async fn test_clear_sign_from_config_and_input_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("data.txt");
        std::fs::write(&input, "file contents").unwrap();

        let config_path = dir.path().join("conf.toml");
        std::fs::write(
            &config_path,
            r#"
[msg_signer]
messaging_brokers = ["amqps://broker-01:5671"]
messaging_cert = "/etc/msg-sign/cert.crt"
messaging_ca_cert = "/etc/msg-sign/ca_cert.crt"
topic_send_to = "topic://Topic.sign"
topic_listen_to = "queue://Consumer.{creator}.{task_id}.Topic.sign.{task_id}"
creator = "msg-sign"
environment = "test"
service = "msg-sign"
timeout = 5
retries = 1
message_id_key = "request_id"
"#,
        )
        .unwrap();

        let broker = InMemoryBroker::new();
        broker.respond_on(SEND_TO, |request| vec![reply_for(request)]);

        let response = clear_sign_with_config(
            Arc::new(broker),
            Some(&config_path),
            &[format!("@{}", input.display())],
            "abcd1234",
            "8",
        )
        .await;

        let automation = AutomationResponse::from_result(response);
        assert!(automation.changed);
        assert!(!automation.failed);
        let message = automation.message.unwrap();
        assert_eq!(signed_claim(&message.operation_results[0]), "signed:file contents");
    }
}

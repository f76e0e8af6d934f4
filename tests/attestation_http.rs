//! Attestation client and poller against a mock Iris server
//!
//! Run with: cargo test --test attestation_http

use std::sync::Arc;
use std::time::Duration;

use cctp_relay::attestation::{AttestationApi, AttestationPoller, IrisClient, PollTarget};
use cctp_relay::hash::message_hash;
use cctp_relay::testing::MockSourceLedger;
use cctp_relay::{AttestationConfig, AttestationStatus, MessageHash};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGE: &[u8] = b"cctp message bytes";

fn attestation_path(hash: &MessageHash) -> String {
    format!("/v1/attestations/{}", hash)
}

fn fast_config(base_url: &str) -> AttestationConfig {
    AttestationConfig {
        base_url: base_url.to_string(),
        poll_interval_ms: 20,
        max_wait_ms: 5_000,
        max_polls: 10,
        request_timeout_ms: 1_000,
        ..AttestationConfig::default()
    }
}

// ============================================================================
// Client
// ============================================================================

mod client {
    use super::*;

    #[tokio::test]
    async fn test_complete_response_parsed() {
        let server = MockServer::start().await;
        let hash = message_hash(MESSAGE);
        Mock::given(method("GET"))
            .and(path(attestation_path(&hash)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "complete",
                "attestation": "0xdeadbeef",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = IrisClient::new(&server.uri()).fetch(&hash).await.unwrap();

        assert_eq!(response.status(), AttestationStatus::Complete);
        assert_eq!(response.attestation_bytes(), Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[tokio::test]
    async fn test_not_found_reads_as_pending() {
        let server = MockServer::start().await;
        let hash = message_hash(MESSAGE);
        Mock::given(method("GET"))
            .and(path(attestation_path(&hash)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = IrisClient::new(&server.uri()).fetch(&hash).await.unwrap();

        assert_eq!(response.status(), AttestationStatus::Pending);
        assert!(response.attestation_bytes().is_none());
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status_and_body() {
        let server = MockServer::start().await;
        let hash = message_hash(MESSAGE);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = IrisClient::new(&server.uri()).fetch(&hash).await.unwrap_err();
        let rendered = format!("{:#}", err);

        assert!(rendered.contains("Attestation query failed"), "{}", rendered);
        assert!(rendered.contains("503"), "{}", rendered);
        assert!(rendered.contains("maintenance"), "{}", rendered);
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = IrisClient::new(&server.uri())
            .fetch(&message_hash(MESSAGE))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_timeout_applies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = IrisClient::with_timeout(&server.uri(), Duration::from_millis(100));
        assert!(client.fetch(&message_hash(MESSAGE)).await.is_err());
    }
}

// ============================================================================
// Poller over HTTP
// ============================================================================

mod poller {
    use super::*;

    #[tokio::test]
    async fn test_poll_until_complete() {
        let server = MockServer::start().await;
        let hash = message_hash(MESSAGE);
        Mock::given(method("GET"))
            .and(path(attestation_path(&hash)))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(attestation_path(&hash)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "complete",
                "attestation": "0x0102",
                "message": format!("0x{}", hex::encode(MESSAGE)),
            })))
            .mount(&server)
            .await;

        let config = fast_config(&server.uri());
        let poller = AttestationPoller::new(
            Arc::new(IrisClient::from_config(&config)),
            Arc::new(MockSourceLedger::new()),
            config,
        );
        let target = PollTarget {
            source_tx_id: "0xburn".to_string(),
            message: Some(MESSAGE.to_vec()),
            message_hash: None,
        };

        let record = poller.poll(&target, None).await.unwrap();

        assert!(record.is_valid());
        assert_eq!(record.message_hash, hash);
        assert_eq!(record.message, MESSAGE.to_vec());
        assert_eq!(record.attestation, vec![0x01, 0x02]);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_authority_hits_attempt_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = fast_config(&server.uri());
        let poller = AttestationPoller::new(
            Arc::new(IrisClient::from_config(&config)),
            Arc::new(MockSourceLedger::new()),
            config,
        );
        let target = PollTarget {
            source_tx_id: "0xburn".to_string(),
            message: Some(MESSAGE.to_vec()),
            message_hash: None,
        };

        let err = poller.poll(&target, None).await.unwrap_err();

        assert_eq!(err.code(), "ATTESTATION_TIMEOUT");
        assert_eq!(server.received_requests().await.unwrap().len(), 10);
    }
}

//! Wire tests for PushClient against a mock gateway.

use fixin_dispatch::{Notifier, NotifyError, PushMessage};
use fixin_push::{PushClient, PushConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> PushClient {
    let config = PushConfig {
        endpoint: format!("{}/v1/send", mock_server.uri()).parse().unwrap(),
        server_key: "test-key".into(),
        timeout_secs: 5,
    };
    PushClient::new(config).unwrap()
}

fn message() -> PushMessage {
    PushMessage {
        token: "device-123".into(),
        title: "Your request was accepted".into(),
        body: "Grúas Sur is on the way".into(),
        data: serde_json::json!({ "request_id": "7f1c", "event": "request_accepted" }),
    }
}

#[tokio::test]
async fn send_posts_envelope_with_bearer_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "message": {
                "token": "device-123",
                "notification": { "title": "Your request was accepted" },
                "data": {
                    "request_id": "7f1c",
                    "click_action": "FLUTTER_NOTIFICATION_CLICK"
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/fixin/messages/1"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    test_client(&mock_server).send(message()).await.unwrap();
}

#[tokio::test]
async fn gateway_rejection_surfaces_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(404).set_body_string("UNREGISTERED"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server).send(message()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Rejected { status: 404 }));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let config = PushConfig {
        endpoint: "http://127.0.0.1:1/v1/send".parse().unwrap(),
        server_key: "test-key".into(),
        timeout_secs: 1,
    };
    let err = PushClient::new(config)
        .unwrap()
        .send(message())
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::Transport(_)));
}

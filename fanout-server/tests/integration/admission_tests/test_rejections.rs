use std::time::Duration;

use axum::extract::ws::Message;
use fanout_core::SignalMessage;

use crate::integration::create_test_service;
use crate::utils::{TestClient, init_tracing};

async fn expect_rejection(client: &mut TestClient, message: &str) {
    let msg = client.recv().await.expect("error message");
    assert_eq!(msg, SignalMessage::error(message));
    assert!(client.wait_closed(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.send_text("{not json");

    expect_rejection(&mut client, "invalid json").await;
    assert_eq!(service.rooms().room_count(), 0);
    assert_eq!(engine.connection_count(), 0);
}

#[tokio::test]
async fn test_first_message_must_be_join() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.send(&SignalMessage::SubReady);

    expect_rejection(&mut client, "invalid join parameters").await;
    assert_eq!(service.rooms().room_count(), 0);
}

#[tokio::test]
async fn test_empty_join_fields_are_rejected() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.send_text(r#"{"type":"join","sessionId":"","userId":"alice"}"#);

    expect_rejection(&mut client, "invalid join parameters").await;
    assert_eq!(service.rooms().room_count(), 0);
}

#[tokio::test]
async fn test_overlong_join_fields_are_rejected() {
    init_tracing();

    let (service, _engine) = create_test_service();

    let mut at_limit = TestClient::join(&service, &"s".repeat(256), "alice").await;
    assert!(at_limit.peer_id.is_some());
    at_limit.disconnect();

    let mut client = TestClient::connect(&service);
    client.send(&SignalMessage::Join {
        session_id: "s1".into(),
        user_id: "u".repeat(257),
        user_name: String::new(),
    });
    expect_rejection(&mut client, "invalid join parameters").await;
    assert!(service.rooms().get("s1").is_none());
}

#[tokio::test]
async fn test_oversized_first_frame_closes_silently() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    let padding = "x".repeat(64 * 1024);
    client.send_text(format!(
        r#"{{"type":"join","sessionId":"s1","userId":"alice","userName":"{}"}}"#,
        padding
    ));

    assert!(client.wait_closed(Duration::from_secs(2)).await);
    assert!(client.history.is_empty(), "no error is sent: {:?}", client.history);
    assert_eq!(service.rooms().room_count(), 0);
    assert_eq!(engine.connection_count(), 0);
}

#[tokio::test]
async fn test_binary_join_is_accepted() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.send_frame(Message::Binary(
        br#"{"type":"join","sessionId":"s1","userId":"alice"}"#.to_vec().into(),
    ));

    client
        .expect("joined", |m| matches!(m, SignalMessage::Joined { .. }))
        .await;
}

#[tokio::test]
async fn test_engine_failure_reports_peer_setup() {
    init_tracing();

    let (service, engine) = create_test_service();
    engine.fail_new_connections(true);

    let mut client = TestClient::connect(&service);
    client.send(&SignalMessage::Join {
        session_id: "s1".into(),
        user_id: "alice".into(),
        user_name: String::new(),
    });

    expect_rejection(&mut client, "peer setup failed").await;
    let room = service.rooms().get("s1").expect("room was resolved before setup");
    assert_eq!(room.peer_count(), 0);
}

#[tokio::test]
async fn test_client_hangup_before_join() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.disconnect();

    assert!(client.wait_closed(Duration::from_secs(2)).await);
    assert!(client.history.is_empty());
    assert_eq!(service.rooms().room_count(), 0);
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use fanout_core::SignalMessage;
use fanout_server::{AuthDecision, Authorizer};
use tokio::time::Instant;

use crate::integration::create_test_service_with;
use crate::utils::{TestClient, init_tracing};

struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn authorize(&self, _user_id: &str, _session_id: &str, _deadline: Instant) -> Result<AuthDecision> {
        Ok(AuthDecision::Denied)
    }
}

struct Unreachable;

#[async_trait]
impl Authorizer for Unreachable {
    async fn authorize(&self, _user_id: &str, _session_id: &str, _deadline: Instant) -> Result<AuthDecision> {
        bail!("policy service unreachable")
    }
}

struct Hanging;

#[async_trait]
impl Authorizer for Hanging {
    async fn authorize(&self, _user_id: &str, _session_id: &str, _deadline: Instant) -> Result<AuthDecision> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(AuthDecision::Allowed)
    }
}

/// Allows only members listed for the session.
struct Membership;

#[async_trait]
impl Authorizer for Membership {
    async fn authorize(&self, user_id: &str, session_id: &str, deadline: Instant) -> Result<AuthDecision> {
        assert!(deadline > Instant::now());
        Ok(match (session_id, user_id) {
            ("standup", "alice") | ("standup", "bob") => AuthDecision::Allowed,
            _ => AuthDecision::Denied,
        })
    }
}

fn join(client: &TestClient, session: &str, user: &str) {
    client.send(&SignalMessage::Join {
        session_id: session.into(),
        user_id: user.into(),
        user_name: String::new(),
    });
}

#[tokio::test]
async fn test_denied_join_creates_nothing() {
    init_tracing();

    let (service, engine) = create_test_service_with(Arc::new(DenyAll));
    let mut client = TestClient::connect(&service);
    join(&client, "s1", "mallory");

    assert_eq!(client.recv().await, Some(SignalMessage::error("access denied")));
    assert!(client.wait_closed(Duration::from_secs(2)).await);
    assert_eq!(service.rooms().room_count(), 0);
    assert_eq!(engine.connection_count(), 0);
}

#[tokio::test]
async fn test_authorizer_error_is_a_failure() {
    init_tracing();

    let (service, engine) = create_test_service_with(Arc::new(Unreachable));
    let mut client = TestClient::connect(&service);
    join(&client, "s1", "alice");

    assert_eq!(
        client.recv().await,
        Some(SignalMessage::error("authorization failed"))
    );
    assert!(client.wait_closed(Duration::from_secs(2)).await);
    assert_eq!(service.rooms().room_count(), 0);
    assert_eq!(engine.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_authorizer_timeout_is_a_failure() {
    init_tracing();

    let (service, engine) = create_test_service_with(Arc::new(Hanging));
    let mut client = TestClient::connect(&service);
    join(&client, "s1", "alice");

    let started = Instant::now();
    let msg = client.recv_timeout(Duration::from_secs(30)).await;
    assert_eq!(msg, Some(SignalMessage::error("authorization failed")));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(60));

    assert!(client.wait_closed(Duration::from_secs(2)).await);
    assert_eq!(service.rooms().room_count(), 0);
    assert_eq!(engine.connection_count(), 0);
}

#[tokio::test]
async fn test_authorizer_sees_session_and_user() {
    init_tracing();

    let (service, _engine) = create_test_service_with(Arc::new(Membership));
    let alice = TestClient::join(&service, "standup", "alice").await;
    assert!(alice.peer_id.is_some());

    let mut eve = TestClient::connect(&service);
    join(&eve, "standup", "eve");
    assert_eq!(eve.recv().await, Some(SignalMessage::error("access denied")));

    let room = service.rooms().get("standup").expect("room");
    assert_eq!(room.peer_count(), 1);
}

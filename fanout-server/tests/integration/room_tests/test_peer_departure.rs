use std::time::Duration;

use fanout_core::{SignalMessage, TrackKind};
use fanout_server::ConnectionState;

use crate::integration::create_test_service;
use crate::utils::{TestClient, init_tracing, wait_until};

fn is_peer_left(m: &SignalMessage) -> bool {
    matches!(m, SignalMessage::PeerLeft { .. })
}

#[tokio::test]
async fn test_departure_unwires_streams_and_notifies_once() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut alice = TestClient::join_ready(&service, "s1", "alice").await;
    let mut bob = TestClient::join_ready(&service, "s1", "bob").await;
    let mut carol = TestClient::join_ready(&service, "s1", "carol").await;
    let alice_conns = engine.peer(0);
    let room = service.rooms().get("s1").expect("room");

    let _cam = alice_conns
        .publish
        .publish("cam", "video0", TrackKind::Video, 42)
        .await;
    assert!(
        wait_until(1000, || {
            room.stream_keys()
                .first()
                .and_then(|key| room.stream(key))
                .is_some_and(|stream| stream.subscriber_count() == 2)
        })
        .await
    );
    let track_id = format!("{}:cam:video0:42", alice.id());

    let alice_id = alice.id();
    alice.disconnect();

    for client in [&mut bob, &mut carol] {
        let left = client.expect("peer_left", is_peer_left).await;
        assert_eq!(left, SignalMessage::PeerLeft { peer_id: alice_id });
    }

    assert!(wait_until(1000, || room.peer_count() == 2).await);
    assert!(room.stream_keys().is_empty());
    for (n, client) in [(1, &bob), (2, &carol)] {
        let peer = room.peer(&client.id()).expect("still in room");
        assert!(peer.subscription_keys().is_empty());
        let conns = engine.peer(n);
        assert!(conns.subscribe.removed_tracks().contains(&track_id));
        assert!(conns.subscribe.track_ids().is_empty());
    }

    assert!(wait_until(1000, || alice_conns.publish.close_count() == 1).await);
    assert_eq!(alice_conns.subscribe.close_count(), 1);

    bob.drain(Duration::from_millis(200)).await;
    carol.drain(Duration::from_millis(200)).await;
    assert_eq!(bob.count(is_peer_left), 1);
    assert_eq!(carol.count(is_peer_left), 1);
    alice.finished().await;
}

#[tokio::test]
async fn test_concurrent_close_releases_once() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut alice = TestClient::join(&service, "s1", "alice").await;
    let mut bob = TestClient::join(&service, "s1", "bob").await;
    let conns = engine.peer(0);
    let peer = service
        .rooms()
        .get("s1")
        .and_then(|room| room.peer(&alice.id()))
        .expect("alice in room");

    let closers: Vec<_> = (0..8)
        .map(|_| {
            let peer = peer.clone();
            tokio::spawn(async move { peer.close().await })
        })
        .collect();
    conns.publish.emit_state(ConnectionState::Failed).await;
    conns.subscribe.emit_state(ConnectionState::Closed).await;
    for closer in closers {
        closer.await.expect("close panicked");
    }

    assert!(peer.is_closed());
    assert!(alice.wait_closed(Duration::from_secs(2)).await);
    bob.expect("peer_left", is_peer_left).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(conns.publish.close_count(), 1);
    assert_eq!(conns.subscribe.close_count(), 1);
    assert_eq!(bob.count(is_peer_left), 1);
}

#[tokio::test]
async fn test_failed_connection_evicts_peer() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut alice = TestClient::join(&service, "s1", "alice").await;
    let mut bob = TestClient::join(&service, "s1", "bob").await;

    // Non-terminal transitions are harmless.
    engine.peer(0).publish.emit_state(ConnectionState::Connecting).await;
    engine.peer(0).publish.emit_state(ConnectionState::Connected).await;
    engine.peer(0).subscribe.emit_state(ConnectionState::Disconnected).await;

    assert!(alice.wait_closed(Duration::from_secs(2)).await);
    let left = bob.expect("peer_left", is_peer_left).await;
    assert_eq!(left, SignalMessage::PeerLeft { peer_id: alice.id() });

    let room = service.rooms().get("s1").expect("room");
    assert!(wait_until(1000, || room.peer_count() == 1).await);
    // The room outlives its members.
    bob.disconnect();
    assert!(wait_until(1000, || room.peer_count() == 0).await);
    assert_eq!(service.rooms().room_count(), 1);
}

#[tokio::test]
async fn test_oversized_frame_after_join_closes_peer() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut alice = TestClient::join(&service, "s1", "alice").await;
    let mut bob = TestClient::join(&service, "s1", "bob").await;

    alice.send_text("x".repeat(64 * 1024 + 1));

    assert!(alice.wait_closed(Duration::from_secs(2)).await);
    bob.expect("peer_left", is_peer_left).await;
}

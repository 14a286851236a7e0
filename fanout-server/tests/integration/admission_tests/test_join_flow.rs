use std::collections::HashSet;

use fanout_core::SignalMessage;

use crate::integration::create_test_service;
use crate::utils::{TestClient, init_tracing};

#[tokio::test]
async fn test_single_peer_joins_room() {
    init_tracing();

    let (service, engine) = create_test_service();
    let mut client = TestClient::connect(&service);
    client.send(&SignalMessage::Join {
        session_id: "s1".into(),
        user_id: "alice".into(),
        user_name: "Alice".into(),
    });

    let first = client.recv().await.expect("peer_list");
    assert_eq!(first, SignalMessage::PeerList { users: vec![] });

    let second = client.recv().await.expect("peer_joined");
    let SignalMessage::PeerJoined(info) = second else {
        panic!("expected peer_joined");
    };
    assert_eq!(info.user_id, "alice");
    assert_eq!(info.user_name, "Alice");
    assert!(info.audio_enabled);
    assert!(info.video_enabled);
    assert!(!info.screen_enabled);

    let third = client.recv().await.expect("joined");
    assert_eq!(third, SignalMessage::Joined { peer_id: info.peer_id });

    let room = service.rooms().get("s1").expect("room exists");
    assert_eq!(service.rooms().room_count(), 1);
    assert_eq!(room.peer_count(), 1);
    assert_eq!(engine.connection_count(), 2);
}

#[tokio::test]
async fn test_roster_excludes_self() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let mut alice = TestClient::join(&service, "s1", "alice").await;
    let bob = TestClient::join(&service, "s1", "bob").await;

    let mut carol = TestClient::connect(&service);
    carol.send(&SignalMessage::Join {
        session_id: "s1".into(),
        user_id: "carol".into(),
        user_name: String::new(),
    });
    let SignalMessage::PeerList { users } = carol
        .expect("peer_list", |m| matches!(m, SignalMessage::PeerList { .. }))
        .await
    else {
        unreachable!();
    };

    let roster: HashSet<_> = users.iter().map(|u| u.peer_id).collect();
    assert_eq!(roster, HashSet::from([alice.id(), bob.id()]));

    // Existing members learn about the newcomer.
    let joined = alice
        .expect("carol's peer_joined", |m| {
            matches!(m, SignalMessage::PeerJoined(info) if info.user_id == "carol")
        })
        .await;
    assert!(matches!(joined, SignalMessage::PeerJoined(_)));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    init_tracing();

    let (service, _engine) = create_test_service();
    let _alice = TestClient::join(&service, "s1", "alice").await;

    let mut bob = TestClient::connect(&service);
    bob.send(&SignalMessage::Join {
        session_id: "s2".into(),
        user_id: "bob".into(),
        user_name: String::new(),
    });
    let list = bob.recv().await.expect("peer_list");
    assert_eq!(list, SignalMessage::PeerList { users: vec![] });
    assert_eq!(service.rooms().room_count(), 2);
}

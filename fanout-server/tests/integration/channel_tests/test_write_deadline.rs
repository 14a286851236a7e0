use fanout_core::SignalMessage;
use fanout_server::SfuConfig;
use tokio::time::Instant;

use crate::integration::create_test_service;
use crate::utils::{TestClient, init_tracing, wait_until};

#[tokio::test(start_paused = true)]
async fn test_write_deadline_evicts_stalled_peer() {
    init_tracing();

    let (service, engine) = create_test_service();
    // peer_list, peer_joined and joined get through, then every write blocks.
    let stalled = TestClient::connect_stalling(&service, 3)
        .join_as("s1", "slow")
        .await;
    let mut alice = TestClient::join(&service, "s1", "alice").await;
    let room = service.rooms().get("s1").expect("room");
    assert_eq!(room.peer_count(), 2);

    // alice's peer_joined is the write that never completes.
    let start = Instant::now();
    assert!(wait_until(10_500, || room.peer_count() == 1).await);
    assert!(start.elapsed() >= SfuConfig::default().write_timeout);
    assert!(room.peer(&stalled.id()).is_none());
    assert_eq!(engine.peer(0).publish.close_count(), 1);

    let left = alice
        .expect("peer_left", |m| matches!(m, SignalMessage::PeerLeft { .. }))
        .await;
    assert_eq!(left, SignalMessage::PeerLeft { peer_id: stalled.id() });

    alice.send(&SignalMessage::Speaking {
        peer_id: None,
        user_id: String::new(),
        speaking: true,
    });
    alice
        .expect("speaking", |m| matches!(m, SignalMessage::Speaking { speaking: true, .. }))
        .await;
}

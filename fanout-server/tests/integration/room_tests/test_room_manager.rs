use std::sync::Arc;

use fanout_server::{RoomManager, SfuConfig};

use crate::utils::init_tracing;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_yields_one_room() {
    init_tracing();

    let manager = RoomManager::new(Arc::new(SfuConfig::default()));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_or_create("standup") })
        })
        .collect();

    let mut rooms = Vec::new();
    for handle in handles {
        rooms.push(handle.await.expect("task panicked"));
    }

    assert_eq!(manager.room_count(), 1);
    assert!(rooms.iter().all(|room| Arc::ptr_eq(room, &rooms[0])));
    assert_eq!(rooms[0].id().as_str(), "standup");
}

#[tokio::test]
async fn test_rooms_are_kept_when_empty() {
    init_tracing();

    let manager = RoomManager::new(Arc::new(SfuConfig::default()));
    let first = manager.get_or_create("a");
    manager.get_or_create("b");

    assert_eq!(manager.room_count(), 2);
    assert!(manager.get("c").is_none());

    let again = manager.get_or_create("a");
    assert!(Arc::ptr_eq(&first, &again));

    let mut stats = manager.stats();
    stats.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    let counts: Vec<_> = stats.iter().map(|(id, n)| (id.as_str().to_owned(), *n)).collect();
    assert_eq!(counts, vec![("a".to_owned(), 0), ("b".to_owned(), 0)]);
}

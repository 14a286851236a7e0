use crate::config::SfuConfig;
use crate::peer::Peer;
use crate::stream::{PublishedStream, StreamKey};
use crate::transport::InboundStream;
use fanout_core::{PeerId, RoomId, SignalMessage, TrackKind, UserInfo};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct RoomState {
    peers: HashMap<PeerId, Arc<Peer>>,
    streams: HashMap<StreamKey, Arc<PublishedStream>>,
}

/// A session: its participants and every stream they publish.
///
/// The lock only guards the two maps. Anything that talks to a peer works on
/// a snapshot taken under the lock and released before the first await.
pub struct Room {
    id: RoomId,
    config: Arc<SfuConfig>,
    state: RwLock<RoomState>,
}

impl Room {
    pub fn new(id: RoomId, config: Arc<SfuConfig>) -> Self {
        Self {
            id,
            config,
            state: RwLock::new(RoomState::default()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.state.read().peers.get(peer_id).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.state.read().peers.len()
    }

    pub fn stream(&self, key: &StreamKey) -> Option<Arc<PublishedStream>> {
        self.state.read().streams.get(key).cloned()
    }

    pub fn stream_keys(&self) -> Vec<StreamKey> {
        self.state.read().streams.keys().cloned().collect()
    }

    fn peers_snapshot(&self) -> Vec<Arc<Peer>> {
        self.state.read().peers.values().cloned().collect()
    }

    /// Roster of everyone except `exclude`.
    pub fn snapshot_users(&self, exclude: &PeerId) -> Vec<UserInfo> {
        self.state
            .read()
            .peers
            .values()
            .filter(|peer| peer.id() != *exclude)
            .map(|peer| peer.user_info())
            .collect()
    }

    /// Registers the peer and subscribes it to everything already published.
    pub async fn add_peer(&self, peer: &Arc<Peer>) {
        let streams: Vec<Arc<PublishedStream>> = {
            let mut state = self.state.write();
            state.peers.insert(peer.id(), Arc::clone(peer));
            state.streams.values().cloned().collect()
        };
        info!(room = %self.id, peer_id = %peer.id(), "Peer joined ({} streams available)", streams.len());

        let mut added = 0;
        for stream in streams {
            match peer.add_subscription(&stream).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => warn!(peer_id = %peer.id(), "Failed to subscribe to {}: {:#}", stream.key(), e),
            }
        }

        if added > 0 {
            peer.renegotiate().await;
        }
    }

    /// Removes the peer, its streams and every subscription to them, then
    /// tells the remaining peers. No-op for an unknown peer.
    pub async fn remove_peer(&self, peer_id: &PeerId) {
        let (removed, remaining) = {
            let mut state = self.state.write();
            if state.peers.remove(peer_id).is_none() {
                return;
            }
            let keys: Vec<StreamKey> = state
                .streams
                .iter()
                .filter(|(_, stream)| stream.publisher_id() == *peer_id)
                .map(|(key, _)| key.clone())
                .collect();
            let removed: Vec<Arc<PublishedStream>> =
                keys.iter().filter_map(|key| state.streams.remove(key)).collect();
            let remaining: Vec<Arc<Peer>> = state.peers.values().cloned().collect();
            (removed, remaining)
        };

        info!(room = %self.id, peer_id = %peer_id, "Peer left, removing {} streams", removed.len());
        self.unwire_streams(&removed, &remaining).await;

        let left = SignalMessage::PeerLeft { peer_id: *peer_id };
        for peer in &remaining {
            if let Err(e) = peer.send(left.clone()).await {
                debug!(peer_id = %peer.id(), "Failed to send peer_left: {}", e);
            }
        }

        let streams: Vec<Arc<PublishedStream>> =
            self.state.read().streams.values().cloned().collect();
        for stream in streams {
            stream.remove_subscriber(peer_id);
        }
    }

    /// Registers a new inbound stream of `publisher` and subscribes every other peer.
    pub async fn add_published_stream(&self, publisher: &Arc<Peer>, source: Arc<dyn InboundStream>) {
        let stream = PublishedStream::new(publisher, source, &self.config);

        let (stale, peers) = {
            let mut state = self.state.write();
            // A departed publisher's streams were already collected by remove_peer.
            if !state.peers.contains_key(&publisher.id()) {
                return;
            }
            let stale = state
                .streams
                .insert(stream.key().clone(), Arc::clone(&stream));
            let peers: Vec<Arc<Peer>> = state.peers.values().cloned().collect();
            (stale, peers)
        };

        if let Some(stale) = stale {
            debug!(room = %self.id, "Replacing stale stream {}", stale.key());
            self.unwire_streams(&[stale], &peers).await;
        }

        stream.start();
        info!(
            room = %self.id,
            peer_id = %publisher.id(),
            kind = %stream.kind(),
            "Published stream {}",
            stream.key()
        );

        for peer in peers {
            if peer.id() == publisher.id() {
                continue;
            }
            match peer.add_subscription(&stream).await {
                Ok(true) => peer.renegotiate().await,
                Ok(false) => {}
                Err(e) => warn!(peer_id = %peer.id(), "Failed to subscribe to {}: {:#}", stream.key(), e),
            }
        }
    }

    /// Removes the publisher's stream named `stream_id`, in either its raw or
    /// `{publisher}:{stream}` form. Returns the number of tracks removed.
    pub async fn remove_published_stream(&self, publisher_id: &PeerId, stream_id: &str) -> usize {
        self.remove_streams_where(|stream| {
            stream.publisher_id() == *publisher_id && stream.matches_stream_id(stream_id)
        })
        .await
    }

    pub async fn remove_published_tracks_by_kind(&self, publisher_id: &PeerId, kind: TrackKind) -> usize {
        self.remove_streams_where(|stream| {
            stream.publisher_id() == *publisher_id && stream.kind() == kind
        })
        .await
    }

    async fn remove_streams_where<F>(&self, matches: F) -> usize
    where
        F: Fn(&PublishedStream) -> bool,
    {
        let (removed, peers) = {
            let mut state = self.state.write();
            let keys: Vec<StreamKey> = state
                .streams
                .iter()
                .filter(|(_, stream)| matches(stream))
                .map(|(key, _)| key.clone())
                .collect();
            let removed: Vec<Arc<PublishedStream>> =
                keys.iter().filter_map(|key| state.streams.remove(key)).collect();
            let peers: Vec<Arc<Peer>> = state.peers.values().cloned().collect();
            (removed, peers)
        };

        for stream in &removed {
            info!(room = %self.id, "Removing stream {}", stream.key());
        }
        self.unwire_streams(&removed, &peers).await;
        removed.len()
    }

    async fn unwire_streams(&self, streams: &[Arc<PublishedStream>], peers: &[Arc<Peer>]) {
        for stream in streams {
            stream.stop();
            for peer in peers {
                peer.remove_subscription(stream).await;
            }
        }
    }

    /// Sends `msg` to every peer, the originator included.
    pub async fn broadcast_to_all(&self, msg: SignalMessage) {
        for peer in self.peers_snapshot() {
            if let Err(e) = peer.send(msg.clone()).await {
                debug!(peer_id = %peer.id(), "Broadcast of {} failed: {}", msg.kind(), e);
            }
        }
    }

    pub async fn broadcast(&self, msg: SignalMessage, exclude: &PeerId) {
        for peer in self.peers_snapshot() {
            if peer.id() == *exclude {
                continue;
            }
            if let Err(e) = peer.send(msg.clone()).await {
                debug!(peer_id = %peer.id(), "Broadcast of {} failed: {}", msg.kind(), e);
            }
        }
    }
}

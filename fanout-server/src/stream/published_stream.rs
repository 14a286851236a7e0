use crate::config::SfuConfig;
use crate::peer::Peer;
use crate::stream::StreamKey;
use crate::stream::forwarder::Forwarder;
use crate::transport::{InboundStream, LocalTrackSpec, OutboundTrack, TrackInfo};
use fanout_core::{PeerId, TrackKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// One inbound track of a publisher, fanned out to every subscriber in the room.
pub struct PublishedStream {
    key: StreamKey,
    publisher_id: PeerId,
    publisher: Weak<Peer>,
    source: Arc<dyn InboundStream>,
    subscribers: RwLock<HashMap<PeerId, Forwarder>>,
    forward_queue: usize,
    keyframe_burst: usize,
    keyframe_interval: Duration,
    stopped: AtomicBool,
    stop: CancellationToken,
}

impl PublishedStream {
    pub fn new(publisher: &Arc<Peer>, source: Arc<dyn InboundStream>, config: &SfuConfig) -> Arc<Self> {
        let publisher_id = publisher.id();
        let key = StreamKey::new(&publisher_id, source.info());

        Arc::new(Self {
            key,
            publisher_id,
            publisher: Arc::downgrade(publisher),
            source,
            subscribers: RwLock::new(HashMap::new()),
            forward_queue: config.forward_queue,
            keyframe_burst: config.keyframe_burst,
            keyframe_interval: config.keyframe_interval,
            stopped: AtomicBool::new(false),
            stop: CancellationToken::new(),
        })
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn publisher_id(&self) -> PeerId {
        self.publisher_id
    }

    pub fn info(&self) -> &TrackInfo {
        self.source.info()
    }

    pub fn kind(&self) -> TrackKind {
        self.source.info().kind
    }

    /// A client may name its stream either by the raw id it published or by
    /// the `{publisher}:{stream}` id subscribers see.
    pub fn matches_stream_id(&self, stream_id: &str) -> bool {
        let raw = &self.source.info().stream_id;
        if stream_id == raw {
            return true;
        }
        stream_id
            .strip_prefix(&self.publisher_id.to_string())
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|rest| rest == raw)
    }

    /// The track subscribers receive. Prefixing with the publisher id keeps
    /// ids unique across publishers that reuse the same stream ids.
    pub fn outbound_spec(&self) -> LocalTrackSpec {
        let info = self.source.info();
        LocalTrackSpec {
            track_id: format!(
                "{}:{}:{}:{}",
                self.publisher_id, info.stream_id, info.track_id, info.ssrc
            ),
            stream_id: format!("{}:{}", self.publisher_id, info.stream_id),
            codec: info.codec.clone(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Spawns the fan-out loop. It runs until the stream is stopped or the source ends.
    pub fn start(self: &Arc<Self>) {
        let stream = Arc::clone(self);
        tokio::spawn(async move { stream.run().await });
    }

    async fn run(self: Arc<Self>) {
        debug!("Fan-out started for {}", self.key);
        let mut dropped: u64 = 0;

        loop {
            let packet = tokio::select! {
                _ = self.stop.cancelled() => break,
                res = self.source.read_packet() => match res {
                    Ok(packet) => packet,
                    Err(e) => {
                        debug!("Source of {} ended: {}", self.key, e);
                        break;
                    }
                },
            };

            let subscribers = self.subscribers.read();
            for forwarder in subscribers.values() {
                if !forwarder.forward(&packet) {
                    dropped += 1;
                }
            }
        }

        debug!("Fan-out finished for {} ({} packets dropped)", self.key, dropped);
    }

    /// Attaches a subscriber's outbound track. Returns false if the stream is
    /// already stopped or the subscriber was already attached.
    pub fn add_subscriber(self: &Arc<Self>, peer_id: PeerId, sink: Arc<dyn OutboundTrack>) -> bool {
        {
            let mut subscribers = self.subscribers.write();
            if self.is_stopped() || subscribers.contains_key(&peer_id) {
                return false;
            }
            subscribers.insert(peer_id, Forwarder::spawn(sink, self.forward_queue));
        }

        trace!("{} subscribed to {}", peer_id.short(), self.key);
        self.request_keyframes();
        true
    }

    pub fn remove_subscriber(&self, peer_id: &PeerId) -> bool {
        self.subscribers.write().remove(peer_id).is_some()
    }

    pub fn has_subscriber(&self, peer_id: &PeerId) -> bool {
        self.subscribers.read().contains_key(peer_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Stops forwarding and releases every subscriber queue. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.cancel();
        self.subscribers.write().clear();
        info!("Stopped stream {}", self.key);
    }

    /// A new subscriber can only decode from a keyframe, so ask the publisher
    /// for a few in case the first request is lost.
    fn request_keyframes(self: &Arc<Self>) {
        let stream = Arc::clone(self);

        tokio::spawn(async move {
            let ssrc = stream.source.info().ssrc;

            for attempt in 0..stream.keyframe_burst {
                if stream.is_stopped() {
                    return;
                }
                let Some(publisher) = stream.publisher.upgrade() else {
                    return;
                };
                if let Err(e) = publisher.request_keyframe(ssrc).await {
                    trace!("Keyframe request for {} failed: {}", stream.key, e);
                }
                drop(publisher);

                if attempt + 1 < stream.keyframe_burst {
                    tokio::select! {
                        _ = stream.stop.cancelled() => return,
                        _ = tokio::time::sleep(stream.keyframe_interval) => {}
                    }
                }
            }
        });
    }
}

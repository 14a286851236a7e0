use crate::config::SfuConfig;
use crate::error::PeerError;
use crate::peer::MediaState;
use crate::peer::negotiation::{Negotiation, NegotiationState};
use crate::peer::outbound::run_writer;
use crate::room::Room;
use crate::signaling::SignalSink;
use crate::stream::{PublishedStream, StreamKey};
use crate::transport::{
    ConnectionRole, IceCandidate, MediaConnection, SessionDescription, TransportEngine,
    TransportEvent, TransportEventReceiver,
};
use anyhow::{Context, Result};
use fanout_core::{CandidateTarget, PeerId, SignalMessage, TrackKind, UserInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TRANSPORT_EVENT_QUEUE: usize = 256;

/// A subscription belongs to one stream instance; a republish under the same
/// key is a different instance.
enum Subscription {
    /// Reserved while the outbound track is being created.
    Pending(Weak<PublishedStream>),
    Active {
        stream: Weak<PublishedStream>,
        track_id: String,
    },
}

impl Subscription {
    fn stream(&self) -> &Weak<PublishedStream> {
        match self {
            Self::Pending(stream) | Self::Active { stream, .. } => stream,
        }
    }

    fn is_for(&self, stream: &Arc<PublishedStream>) -> bool {
        std::ptr::eq(self.stream().as_ptr(), Arc::as_ptr(stream))
    }
}

/// One admitted participant: its two engine connections, its control channel
/// queue and its subscriptions to other participants' streams.
pub struct Peer {
    id: PeerId,
    user_id: String,
    user_name: String,
    room: Weak<Room>,
    config: Arc<SfuConfig>,

    publish: Arc<dyn MediaConnection>,
    subscribe: Arc<dyn MediaConnection>,

    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    events_rx: Mutex<Option<TransportEventReceiver>>,

    subscriptions: Mutex<HashMap<StreamKey, Subscription>>,
    media: RwLock<MediaState>,
    negotiation: tokio::sync::Mutex<Negotiation>,

    closing: AtomicBool,
    closed: CancellationToken,
}

impl Peer {
    /// Creates both engine connections. Nothing runs until the workers are started.
    pub async fn connect(
        engine: &dyn TransportEngine,
        room: &Arc<Room>,
        user_id: String,
        user_name: String,
        config: Arc<SfuConfig>,
    ) -> Result<Arc<Self>> {
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_EVENT_QUEUE);

        let publish = engine
            .new_connection(ConnectionRole::Publish, events_tx.clone())
            .await
            .context("Failed to create publish connection")?;

        let subscribe = match engine
            .new_connection(ConnectionRole::Subscribe, events_tx)
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                let _ = publish.close().await;
                return Err(e.context("Failed to create subscribe connection"));
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue);

        Ok(Arc::new(Self {
            id: PeerId::new(),
            user_id,
            user_name,
            room: Arc::downgrade(room),
            config,
            publish,
            subscribe,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            events_rx: Mutex::new(Some(events_rx)),
            subscriptions: Mutex::new(HashMap::new()),
            media: RwLock::new(MediaState::default()),
            negotiation: tokio::sync::Mutex::new(Negotiation::default()),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }))
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub(crate) fn config(&self) -> &Arc<SfuConfig> {
        &self.config
    }

    pub fn media_state(&self) -> MediaState {
        self.media.read().clone()
    }

    pub fn user_info(&self) -> UserInfo {
        let media = self.media.read();
        UserInfo {
            peer_id: self.id,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            audio_enabled: media.audio_enabled,
            video_enabled: media.video_enabled,
            screen_enabled: media.screen_enabled,
            speaking: media.speaking,
        }
    }

    pub async fn negotiation_state(&self) -> NegotiationState {
        self.negotiation.lock().await.state()
    }

    pub fn subscription_keys(&self) -> Vec<StreamKey> {
        self.subscriptions.lock().keys().cloned().collect()
    }

    pub fn is_subscribed(&self, key: &StreamKey) -> bool {
        self.subscriptions.lock().contains_key(key)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the peer starts closing.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Starts the control channel writer. Must run before the peer is added to
    /// a room, since joining already queues messages for it.
    pub fn start_writer(self: &Arc<Self>, sink: SignalSink) {
        let Some(rx) = self.outbound_rx.lock().take() else {
            warn!(peer_id = %self.id, "Writer already started");
            return;
        };
        tokio::spawn(run_writer(Arc::clone(self), rx, sink));
    }

    /// Starts dispatching engine events (candidates, state changes, inbound streams).
    pub fn start_events(self: &Arc<Self>) {
        let Some(rx) = self.events_rx.lock().take() else {
            warn!(peer_id = %self.id, "Event worker already started");
            return;
        };
        let peer = Arc::clone(self);
        tokio::spawn(async move { peer.run_events(rx).await });
    }

    /// Queues a message for the writer. Waits for queue space unless the peer closes first.
    pub async fn send(&self, msg: SignalMessage) -> Result<(), PeerError> {
        let json = serde_json::to_string(&msg)?;
        debug!(peer_id = %self.id, kind = msg.kind(), "Queueing signal");

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(PeerError::Closed),
            res = self.outbound_tx.send(json) => res.map_err(|_| PeerError::Closed),
        }
    }

    /// Idempotent. Closes both engine connections and stops the workers.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(peer_id = %self.id, user_id = %self.user_id, "Closing peer");
        self.closed.cancel();

        if let Err(e) = self.publish.close().await {
            debug!(peer_id = %self.id, "Closing publish connection: {}", e);
        }
        if let Err(e) = self.subscribe.close().await {
            debug!(peer_id = %self.id, "Closing subscribe connection: {}", e);
        }
    }

    pub(crate) async fn request_keyframe(&self, ssrc: u32) -> Result<()> {
        self.publish.request_keyframe(ssrc).await
    }

    /// Adds an outbound track for `stream` on the subscribe connection.
    ///
    /// Returns Ok(false) if the peer is already subscribed (or became
    /// unsubscribed while the track was being created). Does not renegotiate.
    pub async fn add_subscription(&self, stream: &Arc<PublishedStream>) -> Result<bool> {
        if self.is_closed() || stream.publisher_id() == self.id {
            return Ok(false);
        }

        let key = stream.key().clone();
        {
            let mut subscriptions = self.subscriptions.lock();
            if subscriptions.contains_key(&key) {
                return Ok(false);
            }
            subscriptions.insert(key.clone(), Subscription::Pending(Arc::downgrade(stream)));
        }

        let spec = stream.outbound_spec();
        let track_id = spec.track_id.clone();
        let track = match self.subscribe.add_track(spec).await {
            Ok(track) => track,
            Err(e) => {
                self.release_reservation(&key, stream);
                return Err(e);
            }
        };

        // Only promote our own reservation. The entry may since have been
        // removed, or taken over by a newer instance published under the same key.
        let still_wanted = match self.subscriptions.lock().get_mut(&key) {
            Some(entry) if matches!(entry, Subscription::Pending(_)) && entry.is_for(stream) => {
                *entry = Subscription::Active {
                    stream: Arc::downgrade(stream),
                    track_id: track_id.clone(),
                };
                true
            }
            _ => false,
        };

        if !still_wanted || !stream.add_subscriber(self.id, track) {
            if still_wanted {
                self.release_reservation(&key, stream);
            }
            let _ = self.subscribe.remove_track(&track_id).await;
            return Ok(false);
        }

        debug!(peer_id = %self.id, "Subscribed to {}", key);
        Ok(true)
    }

    fn release_reservation(&self, key: &StreamKey, stream: &Arc<PublishedStream>) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.get(key).is_some_and(|entry| entry.is_for(stream)) {
            subscriptions.remove(key);
        }
    }

    /// Removes the subscription to `stream`, renegotiating if a track was attached.
    /// A subscription to another instance under the same key is left alone.
    pub async fn remove_subscription(&self, stream: &Arc<PublishedStream>) -> bool {
        let key = stream.key();
        let removed = {
            let mut subscriptions = self.subscriptions.lock();
            match subscriptions.get(key) {
                Some(entry) if entry.is_for(stream) => subscriptions.remove(key),
                _ => None,
            }
        };

        match removed {
            Some(Subscription::Active { track_id, .. }) => {
                if let Err(e) = self.subscribe.remove_track(&track_id).await {
                    debug!(peer_id = %self.id, "Removing track {}: {}", track_id, e);
                }
                debug!(peer_id = %self.id, "Unsubscribed from {}", key);
                self.renegotiate().await;
                true
            }
            // The in-flight add sees the missing entry and cleans up.
            Some(Subscription::Pending(_)) => true,
            None => false,
        }
    }

    /// Requests a fresh subscribe offer, coalescing with any in flight.
    pub async fn renegotiate(&self) {
        if self.is_closed() {
            return;
        }
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.request() {
            self.send_subscribe_offer(&mut negotiation).await;
        }
    }

    async fn send_subscribe_offer(&self, negotiation: &mut Negotiation) {
        let offer = match self.subscribe.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                debug!(peer_id = %self.id, "Failed to create subscribe offer: {}", e);
                return;
            }
        };
        if let Err(e) = self.subscribe.set_local_description(offer.clone()).await {
            debug!(peer_id = %self.id, "Failed to apply subscribe offer: {}", e);
            return;
        }

        negotiation.offer_sent();
        if let Err(e) = self.send(SignalMessage::SubOffer { sdp: offer.sdp }).await {
            debug!(peer_id = %self.id, "Failed to send sub_offer: {}", e);
        }
    }

    /// Applies one inbound control message.
    pub async fn handle_signal(&self, msg: SignalMessage) {
        match msg {
            SignalMessage::PubOffer { sdp } => self.on_publish_offer(sdp).await,
            SignalMessage::SubAnswer { sdp } => self.on_subscribe_answer(sdp).await,
            SignalMessage::SubReady => self.on_subscribe_ready().await,
            SignalMessage::Candidate {
                target,
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => {
                let candidate = IceCandidate {
                    candidate,
                    sdp_mid,
                    sdp_m_line_index,
                };
                self.on_remote_candidate(target, candidate).await
            }
            SignalMessage::MediaState {
                audio_enabled,
                video_enabled,
                screen_enabled,
                ..
            } => {
                {
                    let mut media = self.media.write();
                    media.audio_enabled = audio_enabled;
                    media.video_enabled = video_enabled;
                    media.screen_enabled = screen_enabled;
                }
                debug!(
                    peer_id = %self.id,
                    "media_state audio={} video={} screen={}",
                    audio_enabled, video_enabled, screen_enabled
                );
                self.broadcast_to_room(SignalMessage::MediaState {
                    peer_id: Some(self.id),
                    user_id: self.user_id.clone(),
                    audio_enabled,
                    video_enabled,
                    screen_enabled,
                })
                .await;
            }
            SignalMessage::ScreenStream {
                screen_enabled,
                screen_stream_id,
                ..
            } => {
                let screen_stream_id = {
                    let mut media = self.media.write();
                    media.screen_enabled = screen_enabled;
                    media.screen_stream_id = if screen_enabled {
                        screen_stream_id
                    } else {
                        String::new()
                    };
                    media.screen_stream_id.clone()
                };
                self.broadcast_to_room(SignalMessage::ScreenStream {
                    peer_id: Some(self.id),
                    user_id: self.user_id.clone(),
                    screen_enabled,
                    screen_stream_id,
                })
                .await;
            }
            SignalMessage::Speaking { speaking, .. } => {
                self.media.write().speaking = speaking;
                self.broadcast_to_room(SignalMessage::Speaking {
                    peer_id: Some(self.id),
                    user_id: self.user_id.clone(),
                    speaking,
                })
                .await;
            }
            SignalMessage::TrackRemoved {
                track_kind,
                stream_id,
                ..
            } => self.on_track_removed(track_kind, stream_id).await,
            other => {
                warn!(peer_id = %self.id, "Ignoring unexpected {} message", other.kind());
            }
        }
    }

    async fn on_publish_offer(&self, sdp: String) {
        if sdp.is_empty() {
            return;
        }
        if let Err(e) = self.answer_publish_offer(sdp).await {
            debug!(peer_id = %self.id, "pub_offer failed: {:#}", e);
        }
    }

    async fn answer_publish_offer(&self, sdp: String) -> Result<()> {
        self.publish
            .set_remote_description(SessionDescription::offer(sdp))
            .await
            .context("set remote offer")?;
        let answer = self.publish.create_answer().await.context("create answer")?;
        self.publish
            .set_local_description(answer.clone())
            .await
            .context("set local answer")?;
        self.send(SignalMessage::PubAnswer { sdp: answer.sdp }).await?;
        Ok(())
    }

    async fn on_subscribe_ready(&self) {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.mark_ready() {
            self.send_subscribe_offer(&mut negotiation).await;
        }
    }

    async fn on_subscribe_answer(&self, sdp: String) {
        if sdp.is_empty() {
            return;
        }
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.state() != NegotiationState::Negotiating {
            warn!(peer_id = %self.id, "sub_answer without an outstanding offer");
            return;
        }
        if let Err(e) = self
            .subscribe
            .set_remote_description(SessionDescription::answer(sdp))
            .await
        {
            debug!(peer_id = %self.id, "Failed to apply sub_answer: {}", e);
            return;
        }
        if negotiation.answer_applied() {
            self.send_subscribe_offer(&mut negotiation).await;
        }
    }

    async fn on_remote_candidate(&self, target: CandidateTarget, candidate: IceCandidate) {
        if candidate.candidate.is_empty() {
            return;
        }
        let conn = match ConnectionRole::from(target) {
            ConnectionRole::Publish => &self.publish,
            ConnectionRole::Subscribe => &self.subscribe,
        };
        if let Err(e) = conn.add_ice_candidate(candidate).await {
            debug!(peer_id = %self.id, "Failed to add {} candidate: {}", ConnectionRole::from(target), e);
        }
    }

    async fn on_track_removed(&self, track_kind: String, stream_id: String) {
        info!(
            peer_id = %self.id,
            "track_removed kind={} stream={}",
            track_kind, stream_id
        );
        let Some(room) = self.room.upgrade() else {
            return;
        };

        room.broadcast_to_all(SignalMessage::TrackRemoved {
            peer_id: Some(self.id),
            user_id: self.user_id.clone(),
            track_kind: track_kind.clone(),
            stream_id: stream_id.clone(),
        })
        .await;

        if !stream_id.is_empty() {
            room.remove_published_stream(&self.id, &stream_id).await;
        } else if let Ok(kind) = track_kind.parse::<TrackKind>() {
            room.remove_published_tracks_by_kind(&self.id, kind).await;
        }
    }

    async fn broadcast_to_room(&self, msg: SignalMessage) {
        if let Some(room) = self.room.upgrade() {
            room.broadcast_to_all(msg).await;
        }
    }

    async fn run_events(self: Arc<Self>, mut events: TransportEventReceiver) {
        loop {
            let event = tokio::select! {
                _ = self.closed.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                TransportEvent::CandidateGenerated(role, candidate) => {
                    let msg = SignalMessage::Candidate {
                        target: role.into(),
                        candidate: candidate.candidate,
                        sdp_mid: candidate.sdp_mid,
                        sdp_m_line_index: candidate.sdp_m_line_index,
                    };
                    if let Err(e) = self.send(msg).await {
                        debug!(peer_id = %self.id, "Dropping {} candidate: {}", role, e);
                    }
                }
                TransportEvent::StateChanged(role, state) => {
                    debug!(peer_id = %self.id, "{} connection is {:?}", role, state);
                    if state.is_terminal() {
                        info!(peer_id = %self.id, "{} connection {:?}, closing peer", role, state);
                        // Closing tears down the connections that feed this loop.
                        let peer = Arc::clone(&self);
                        tokio::spawn(async move { peer.close().await });
                    }
                }
                TransportEvent::InboundStream(source) => {
                    let Some(room) = self.room.upgrade() else {
                        continue;
                    };
                    let peer = Arc::clone(&self);
                    tokio::spawn(async move { room.add_published_stream(&peer, source).await });
                }
            }
        }
    }
}

use crate::config::SfuConfig;
use crate::error::AdmissionError;
use crate::peer::Peer;
use crate::room::{Room, RoomManager};
use crate::signaling::{AuthDecision, Authorizer, SignalSink, SignalStream};
use crate::transport::TransportEngine;
use axum::extract::ws::Message;
use fanout_core::SignalMessage;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

/// A validated, authorized `join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
}

struct SignalingInner {
    rooms: RoomManager,
    engine: Arc<dyn TransportEngine>,
    authorizer: Arc<dyn Authorizer>,
    config: Arc<SfuConfig>,
}

/// Entry point for control channels: admits the client, then runs its peer
/// until the channel or the peer goes away.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(
        engine: Arc<dyn TransportEngine>,
        authorizer: Arc<dyn Authorizer>,
        config: SfuConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            inner: Arc::new(SignalingInner {
                rooms: RoomManager::new(Arc::clone(&config)),
                engine,
                authorizer,
                config,
            }),
        }
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.inner.rooms
    }

    pub fn config(&self) -> &SfuConfig {
        &self.inner.config
    }

    /// Drives one control channel from the first frame to teardown.
    pub async fn serve(&self, mut sink: SignalSink, mut stream: SignalStream) {
        let join = match self.admit(&mut stream).await {
            Ok(join) => join,
            Err(e) => {
                self.reject(&mut sink, &e).await;
                return;
            }
        };

        let room = self.inner.rooms.get_or_create(&join.session_id);
        let peer = match Peer::connect(
            self.inner.engine.as_ref(),
            &room,
            join.user_id.clone(),
            join.user_name.clone(),
            Arc::clone(&self.inner.config),
        )
        .await
        {
            Ok(peer) => peer,
            Err(e) => {
                self.reject(&mut sink, &AdmissionError::PeerSetup(e)).await;
                return;
            }
        };

        info!(
            peer_id = %peer.id(),
            user_id = %join.user_id,
            session = %join.session_id,
            rooms = self.inner.rooms.room_count(),
            "Peer connected"
        );

        peer.start_writer(sink);
        self.welcome(&room, &peer).await;
        peer.start_events();

        read_loop(&peer, &mut stream, &self.inner.config).await;

        room.remove_peer(&peer.id()).await;
        peer.close().await;
        info!(
            peer_id = %peer.id(),
            session = %join.session_id,
            "Peer disconnected ({} left in room)",
            room.peer_count()
        );
    }

    async fn welcome(&self, room: &Arc<Room>, peer: &Arc<Peer>) {
        room.add_peer(peer).await;

        let users = room.snapshot_users(&peer.id());
        if let Err(e) = peer.send(SignalMessage::PeerList { users }).await {
            debug!(peer_id = %peer.id(), "Failed to send peer_list: {}", e);
        }
        room.broadcast_to_all(SignalMessage::PeerJoined(peer.user_info()))
            .await;
        if let Err(e) = peer.send(SignalMessage::Joined { peer_id: peer.id() }).await {
            debug!(peer_id = %peer.id(), "Failed to send joined: {}", e);
        }
    }

    /// Reads, validates and authorizes the first frame of a new channel.
    pub async fn admit(&self, stream: &mut SignalStream) -> Result<JoinRequest, AdmissionError> {
        let config = &self.inner.config;
        let payload = read_first_frame(stream, config).await?;

        let SignalMessage::Join {
            session_id,
            user_id,
            user_name,
        } = serde_json::from_slice::<SignalMessage>(&payload)?
        else {
            return Err(AdmissionError::InvalidJoin);
        };

        if !valid_field(&session_id, config.max_field_len) || !valid_field(&user_id, config.max_field_len) {
            return Err(AdmissionError::InvalidJoin);
        }

        let deadline = Instant::now() + config.auth_timeout;
        let decision = timeout_at(
            deadline,
            self.inner.authorizer.authorize(&user_id, &session_id, deadline),
        )
        .await;

        match decision {
            Err(_) => Err(AdmissionError::AuthorizationFailed("timed out".to_owned())),
            Ok(Err(e)) => Err(AdmissionError::AuthorizationFailed(format!("{:#}", e))),
            Ok(Ok(AuthDecision::Denied)) => Err(AdmissionError::AccessDenied),
            Ok(Ok(AuthDecision::Allowed)) => Ok(JoinRequest {
                session_id,
                user_id,
                user_name,
            }),
        }
    }

    async fn reject(&self, sink: &mut SignalSink, reason: &AdmissionError) {
        match reason {
            AdmissionError::PeerSetup(e) => error!("Peer setup failed: {:#}", e),
            _ => warn!("Connection rejected: {}", reason),
        }
        let write_timeout = self.inner.config.write_timeout;

        if let Some(text) = reason.client_message() {
            match serde_json::to_string(&SignalMessage::error(text)) {
                Ok(json) => {
                    let _ = timeout(write_timeout, sink.send(Message::Text(json.into()))).await;
                }
                Err(e) => debug!("Failed to encode error message: {}", e),
            }
        }
        let _ = timeout(write_timeout, sink.close()).await;
    }
}

fn valid_field(value: &str, max_len: usize) -> bool {
    !value.is_empty() && value.chars().count() <= max_len
}

fn check_size(len: usize, config: &SfuConfig) -> Result<(), AdmissionError> {
    if len > config.max_message_size {
        return Err(AdmissionError::TooLarge {
            size: len,
            limit: config.max_message_size,
        });
    }
    Ok(())
}

async fn read_first_frame(stream: &mut SignalStream, config: &SfuConfig) -> Result<Vec<u8>, AdmissionError> {
    let deadline = Instant::now() + config.read_timeout;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => return Err(AdmissionError::Read("timed out".to_owned())),
            Ok(None) => return Err(AdmissionError::Read("channel closed".to_owned())),
            Ok(Some(Err(e))) => return Err(AdmissionError::Read(format!("{:#}", e))),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                check_size(text.len(), config)?;
                return Ok(text.as_str().as_bytes().to_vec());
            }
            Message::Binary(data) => {
                check_size(data.len(), config)?;
                return Ok(data.to_vec());
            }
            Message::Close(_) => return Err(AdmissionError::Read("channel closed".to_owned())),
            Message::Ping(_) | Message::Pong(_) => continue,
        }
    }
}

/// Feeds inbound frames to the peer until the channel fails, goes quiet for
/// a whole read window, or the peer closes.
async fn read_loop(peer: &Arc<Peer>, stream: &mut SignalStream, config: &SfuConfig) {
    loop {
        let next = tokio::select! {
            _ = peer.closed() => break,
            next = timeout(config.read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                info!(peer_id = %peer.id(), "Read timed out");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(peer_id = %peer.id(), "Read failed: {:#}", e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let payload = match &frame {
            Message::Text(text) => text.as_str().as_bytes(),
            Message::Binary(data) => data.as_ref(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if payload.len() > config.max_message_size {
            warn!(peer_id = %peer.id(), "Frame of {} bytes exceeds limit, closing", payload.len());
            break;
        }

        match serde_json::from_slice::<SignalMessage>(payload) {
            Ok(msg) => peer.handle_signal(msg).await,
            Err(e) => warn!(peer_id = %peer.id(), "Invalid signal: {}", e),
        }
    }
}

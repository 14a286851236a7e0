use crate::transport::TransportEventSender;
use anyhow::Result;
use async_trait::async_trait;
use fanout_core::{CandidateTarget, TrackKind};
use std::fmt;
use std::sync::Arc;

/// One RTP packet travelling from a publisher to its subscribers.
pub type MediaPacket = webrtc::rtp::packet::Packet;

/// The two connections every participant holds with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Receive-only, carries the participant's own media.
    Publish,
    /// Send-only, carries the other participants' media.
    Subscribe,
}

impl From<ConnectionRole> for CandidateTarget {
    fn from(role: ConnectionRole) -> Self {
        match role {
            ConnectionRole::Publish => CandidateTarget::Publish,
            ConnectionRole::Subscribe => CandidateTarget::Subscribe,
        }
    }
}

impl From<CandidateTarget> for ConnectionRole {
    fn from(target: CandidateTarget) -> Self {
        match target {
            CandidateTarget::Publish => ConnectionRole::Publish,
            CandidateTarget::Subscribe => ConnectionRole::Subscribe,
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish => f.write_str("pub"),
            Self::Subscribe => f.write_str("sub"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States after which the participant is torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSpec {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
}

/// What the engine knows about a stream a client publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub stream_id: String,
    pub track_id: String,
    pub kind: TrackKind,
    pub ssrc: u32,
    pub codec: CodecSpec,
}

/// Parameters of a track the server adds to a subscribe connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrackSpec {
    pub track_id: String,
    pub stream_id: String,
    pub codec: CodecSpec,
}

#[async_trait]
pub trait InboundStream: Send + Sync {
    fn info(&self) -> &TrackInfo;

    /// Waits for the next packet; an error means the stream has ended.
    async fn read_packet(&self) -> Result<MediaPacket>;
}

#[async_trait]
pub trait OutboundTrack: Send + Sync {
    fn id(&self) -> &str;

    async fn write_packet(&self, packet: &MediaPacket) -> Result<()>;
}

/// A single engine connection (publish or subscribe side of one participant).
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_track(&self, spec: LocalTrackSpec) -> Result<Arc<dyn OutboundTrack>>;

    async fn remove_track(&self, track_id: &str) -> Result<()>;

    /// Ask the remote sender of `ssrc` for a fresh keyframe.
    async fn request_keyframe(&self, ssrc: u32) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Factory for engine connections. Events for the new connection are pushed into `events`.
#[async_trait]
pub trait TransportEngine: Send + Sync + 'static {
    async fn new_connection(
        &self,
        role: ConnectionRole,
        events: TransportEventSender,
    ) -> Result<Arc<dyn MediaConnection>>;
}

use crate::model::peer::PeerId;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Which of the participant's two connections an ICE candidate belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CandidateTarget {
    /// The connection carrying the participant's own media to the server.
    #[default]
    #[serde(rename = "pub")]
    Publish,
    /// The connection carrying everyone else's media back to the participant.
    #[serde(rename = "sub")]
    Subscribe,
}

impl<'de> Deserialize<'de> for CandidateTarget {
    // Anything other than "sub" addresses the publish connection.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == "sub" {
            Self::Subscribe
        } else {
            Self::Publish
        })
    }
}

/// Roster entry describing one participant and its media flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub peer_id: PeerId,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(default)]
    pub audio_enabled: bool,
    #[serde(default)]
    pub video_enabled: bool,
    #[serde(default)]
    pub screen_enabled: bool,
    #[serde(default)]
    pub speaking: bool,
}

/// Control-channel envelope. Every frame is one JSON object discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SignalMessage {
    Join {
        #[serde(default)]
        session_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        user_name: String,
    },
    Joined {
        peer_id: PeerId,
    },
    PeerList {
        #[serde(default)]
        users: Vec<UserInfo>,
    },
    PeerJoined(UserInfo),
    PeerLeft {
        peer_id: PeerId,
    },
    PubOffer {
        #[serde(default)]
        sdp: String,
    },
    PubAnswer {
        #[serde(default)]
        sdp: String,
    },
    SubOffer {
        #[serde(default)]
        sdp: String,
    },
    SubAnswer {
        #[serde(default)]
        sdp: String,
    },
    Candidate {
        #[serde(default)]
        target: CandidateTarget,
        #[serde(default)]
        candidate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp_m_line_index: Option<u16>,
    },
    SubReady,
    MediaState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        user_id: String,
        #[serde(default)]
        audio_enabled: bool,
        #[serde(default)]
        video_enabled: bool,
        #[serde(default)]
        screen_enabled: bool,
    },
    ScreenStream {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        user_id: String,
        #[serde(default)]
        screen_enabled: bool,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        screen_stream_id: String,
    },
    Speaking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        user_id: String,
        #[serde(default)]
        speaking: bool,
    },
    TrackRemoved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        user_id: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        track_kind: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stream_id: String,
    },
    Error {
        message: String,
    },
    /// Any `type` this server does not understand.
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire name of the message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Joined { .. } => "joined",
            Self::PeerList { .. } => "peer_list",
            Self::PeerJoined(_) => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::PubOffer { .. } => "pub_offer",
            Self::PubAnswer { .. } => "pub_answer",
            Self::SubOffer { .. } => "sub_offer",
            Self::SubAnswer { .. } => "sub_answer",
            Self::Candidate { .. } => "candidate",
            Self::SubReady => "sub_ready",
            Self::MediaState { .. } => "media_state",
            Self::ScreenStream { .. } => "screen_stream",
            Self::Speaking { .. } => "speaking",
            Self::TrackRemoved { .. } => "track_removed",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

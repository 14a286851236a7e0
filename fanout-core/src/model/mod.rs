mod peer;
mod room;
mod signaling;
mod track;

pub use peer::PeerId;
pub use room::RoomId;
pub use signaling::{CandidateTarget, IceServerConfig, SignalMessage, UserInfo};
pub use track::{TrackKind, UnknownTrackKind};

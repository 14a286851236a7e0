use crate::transport::TrackInfo;
use fanout_core::PeerId;
use std::fmt;

/// Room-unique identity of one published track: `{publisher}:{stream}:{track}`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct StreamKey(String);

impl StreamKey {
    pub fn new(publisher: &PeerId, info: &TrackInfo) -> Self {
        Self(format!("{}:{}:{}", publisher, info.stream_id, info.track_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

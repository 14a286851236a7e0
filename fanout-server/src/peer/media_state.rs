/// Media flags a participant advertises to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_enabled: bool,
    pub screen_stream_id: String,
    pub speaking: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            screen_enabled: false,
            screen_stream_id: String::new(),
            speaking: false,
        }
    }
}

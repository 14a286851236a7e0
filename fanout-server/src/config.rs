use std::time::Duration;

/// Limits and timings of the signaling layer.
#[derive(Debug, Clone)]
pub struct SfuConfig {
    /// Largest control frame accepted from a client, in bytes.
    pub max_message_size: usize,
    /// Longest accepted `sessionId` / `userId`, in characters.
    pub max_field_len: usize,
    pub auth_timeout: Duration,
    /// Read window; any inbound frame restarts it.
    pub read_timeout: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
    /// Capacity of each peer's outbound signal queue.
    pub outbound_queue: usize,
    /// Capacity of each subscriber's packet queue.
    pub forward_queue: usize,
    pub keyframe_burst: usize,
    pub keyframe_interval: Duration,
}

impl Default for SfuConfig {
    fn default() -> Self {
        let read_timeout = Duration::from_secs(30);
        Self {
            max_message_size: 64 * 1024,
            max_field_len: 256,
            auth_timeout: Duration::from_secs(5),
            read_timeout,
            ping_interval: read_timeout * 9 / 10,
            write_timeout: Duration::from_secs(10),
            outbound_queue: 32,
            forward_queue: 256,
            keyframe_burst: 5,
            keyframe_interval: Duration::from_millis(500),
        }
    }
}

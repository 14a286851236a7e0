use crate::transport::{MediaPacket, OutboundTrack};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Per-subscriber packet queue with its own writer task.
///
/// The fan-out loop never waits on a subscriber: when the queue is full the
/// packet is dropped for that subscriber only. Dropping the forwarder ends the task.
pub(crate) struct Forwarder {
    tx: mpsc::Sender<MediaPacket>,
}

impl Forwarder {
    pub(crate) fn spawn(sink: Arc<dyn OutboundTrack>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<MediaPacket>(capacity);

        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                if let Err(e) = sink.write_packet(&packet).await {
                    trace!("Write to {} failed: {}", sink.id(), e);
                }
            }
        });

        Self { tx }
    }

    /// Returns false when the packet had to be dropped.
    pub(crate) fn forward(&self, packet: &MediaPacket) -> bool {
        self.tx.try_send(packet.clone()).is_ok()
    }
}

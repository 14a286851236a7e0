use crate::transport::{
    CodecSpec, ConnectionRole, ConnectionState, IceCandidate, InboundStream, LocalTrackSpec,
    MediaConnection, MediaPacket, OutboundTrack, SdpKind, SessionDescription, TrackInfo,
    TransportConfig, TransportEngine, TransportEvent, TransportEventSender,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use fanout_core::TrackKind;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpHeaderExtensionCapability, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

const RTCP_READ_BUFFER: usize = 1500;

const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
const SDES_RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";
const SDES_REPAIR_RTP_STREAM_ID_URI: &str =
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";

/// Header extensions clients use to label simulcast layers.
const HEADER_EXTENSIONS: &[(&str, RTPCodecType)] = &[
    (SDES_MID_URI, RTPCodecType::Audio),
    (SDES_MID_URI, RTPCodecType::Video),
    (SDES_RTP_STREAM_ID_URI, RTPCodecType::Video),
    (SDES_REPAIR_RTP_STREAM_ID_URI, RTPCodecType::Video),
];

/// Transport engine backed by the `webrtc` crate.
pub struct WebRtcEngine {
    api: API,
    config: TransportConfig,
}

impl WebRtcEngine {
    /// Registers codecs, header extensions and interceptors once; a failure here
    /// is a startup error.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("Failed to register default codecs")?;

        for &(uri, kind) in HEADER_EXTENSIONS {
            media_engine
                .register_header_extension(
                    RTCRtpHeaderExtensionCapability { uri: uri.to_owned() },
                    kind,
                    None,
                )
                .with_context(|| format!("Failed to register header extension {}", uri))?;
        }

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .context("Failed to register interceptors")?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, config })
    }
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn new_connection(
        &self,
        role: ConnectionRole,
        events: TransportEventSender,
    ) -> Result<Arc<dyn MediaConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.config.rtc_ice_servers(),
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(rtc_config).await?);

        if role == ConnectionRole::Publish {
            for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
                peer_connection
                    .add_transceiver_from_kind(
                        kind,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await
                    .context("Failed to add receive-only transceiver")?;
            }
        }

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();

                Box::pin(async move {
                    debug!("{} connection state changed: {:?}", role, s);
                    let state = match s {
                        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => ConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => ConnectionState::Failed,
                        RTCPeerConnectionState::Closed => ConnectionState::Closed,
                        _ => ConnectionState::New,
                    };
                    let _ = tx.send(TransportEvent::StateChanged(role, state)).await;
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(role, candidate))
                    .await;
            })
        }));

        if role == ConnectionRole::Publish {
            let track_tx = events;
            peer_connection.on_track(Box::new(
                move |track: Arc<TrackRemote>,
                      _receiver: Arc<RTCRtpReceiver>,
                      _transceiver: Arc<RTCRtpTransceiver>| {
                    let tx = track_tx.clone();

                    Box::pin(async move {
                        let stream = WebRtcInboundStream::new(track);
                        info!(
                            stream_id = %stream.info.stream_id,
                            track_id = %stream.info.track_id,
                            kind = %stream.info.kind,
                            codec = %stream.info.codec.mime_type,
                            "Inbound track started"
                        );
                        let _ = tx
                            .send(TransportEvent::InboundStream(Arc::new(stream)))
                            .await;
                    })
                },
            ));
        }

        Ok(Arc::new(WebRtcConnection {
            role,
            peer_connection,
            senders: DashMap::new(),
        }))
    }
}

pub struct WebRtcConnection {
    role: ConnectionRole,
    peer_connection: Arc<RTCPeerConnection>,
    senders: DashMap<String, Arc<RTCRtpSender>>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_track(&self, spec: LocalTrackSpec) -> Result<Arc<dyn OutboundTrack>> {
        let capability = RTCRtpCodecCapability {
            mime_type: spec.codec.mime_type,
            clock_rate: spec.codec.clock_rate,
            channels: spec.codec.channels,
            sdp_fmtp_line: spec.codec.sdp_fmtp_line,
            ..Default::default()
        };
        let track = Arc::new(TrackLocalStaticRTP::new(
            capability,
            spec.track_id.clone(),
            spec.stream_id,
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .with_context(|| format!("Failed to add track {} on {}", spec.track_id, self.role))?;

        // Interceptors only run while someone reads the sender's RTCP.
        let rtcp_sender = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RTCP_READ_BUFFER];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        self.senders.insert(spec.track_id.clone(), sender);

        Ok(Arc::new(WebRtcOutboundTrack {
            id: spec.track_id,
            track,
        }))
    }

    async fn remove_track(&self, track_id: &str) -> Result<()> {
        let Some((_, sender)) = self.senders.remove(track_id) else {
            return Ok(());
        };
        self.peer_connection.remove_track(&sender).await?;
        Ok(())
    }

    async fn request_keyframe(&self, ssrc: u32) -> Result<()> {
        self.peer_connection
            .write_rtcp(&[Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc: ssrc,
            })])
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.senders.clear();
        self.peer_connection.close().await?;
        Ok(())
    }
}

struct WebRtcInboundStream {
    info: TrackInfo,
    track: Arc<TrackRemote>,
}

impl WebRtcInboundStream {
    fn new(track: Arc<TrackRemote>) -> Self {
        let capability = track.codec().capability;
        let kind = match track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        };

        Self {
            info: TrackInfo {
                stream_id: track.stream_id(),
                track_id: track.id(),
                kind,
                ssrc: track.ssrc(),
                codec: CodecSpec {
                    mime_type: capability.mime_type,
                    clock_rate: capability.clock_rate,
                    channels: capability.channels,
                    sdp_fmtp_line: capability.sdp_fmtp_line,
                },
            },
            track,
        }
    }
}

#[async_trait]
impl InboundStream for WebRtcInboundStream {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_packet(&self) -> Result<MediaPacket> {
        let (packet, _) = self.track.read_rtp().await?;
        Ok(packet)
    }
}

struct WebRtcOutboundTrack {
    id: String,
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl OutboundTrack for WebRtcOutboundTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_packet(&self, packet: &MediaPacket) -> Result<()> {
        self.track.write_rtp(packet).await?;
        Ok(())
    }
}

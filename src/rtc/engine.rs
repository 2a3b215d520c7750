//! `webrtc` engine bindings.
//!
//! Builds peer connections from the configured codec and ICE settings and
//! implements the [`PeerSession`] seam over [`RTCPeerConnection`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{
    MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9,
};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::{RTCPFeedback, RTCRtpTransceiver};

use super::session::{
    GatheringCompleteHandler, GatheringState, PeerSession, SenderSlot, SessionTransceiver,
};
use crate::config::RtcConfig;
use crate::error::{Error, Result};
use crate::types::{CodecCapability, IceCandidate, MediaKind, SdpKind, SessionDescription};

impl From<RTPCodecType> for MediaKind {
    fn from(codec_type: RTPCodecType) -> Self {
        match codec_type {
            RTPCodecType::Audio => Self::Audio,
            _ => Self::Video,
        }
    }
}

impl From<RTCRtpCodecCapability> for CodecCapability {
    fn from(capability: RTCRtpCodecCapability) -> Self {
        Self {
            mime_type: capability.mime_type,
            clock_rate: capability.clock_rate,
            channels: capability.channels,
            sdp_fmtp_line: capability.sdp_fmtp_line,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

fn to_engine_description(sd: SessionDescription) -> Result<RTCSessionDescription> {
    let desc = match sd.kind {
        SdpKind::Offer => RTCSessionDescription::offer(sd.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(sd.sdp)?,
    };
    Ok(desc)
}

fn from_engine_description(sd: RTCSessionDescription) -> Option<SessionDescription> {
    let kind = match sd.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer | RTCSdpType::Pranswer => SdpKind::Answer,
        _ => return None,
    };
    Some(SessionDescription { kind, sdp: sd.sdp })
}

/// Register the configured codecs with the media engine. An empty list
/// falls back to the engine's default codec set.
fn register_codecs(media_engine: &mut MediaEngine, config: &RtcConfig) -> Result<()> {
    if config.enabled_codecs.is_empty() {
        media_engine.register_default_codecs()?;
        return Ok(());
    }

    let video_rtcp_feedback = vec![
        RTCPFeedback {
            typ: "goog-remb".to_owned(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "ccm".to_owned(),
            parameter: "fir".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "pli".to_owned(),
        },
    ];

    for spec in &config.enabled_codecs {
        let (capability, payload_type, codec_type) =
            if spec.mime.eq_ignore_ascii_case(MIME_TYPE_OPUS) {
                (
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_OPUS.to_owned(),
                        clock_rate: 48000,
                        channels: 2,
                        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                        rtcp_feedback: vec![],
                    },
                    111,
                    RTPCodecType::Audio,
                )
            } else if spec.mime.eq_ignore_ascii_case(MIME_TYPE_VP8) {
                (
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_VP8.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: String::new(),
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    96,
                    RTPCodecType::Video,
                )
            } else if spec.mime.eq_ignore_ascii_case(MIME_TYPE_VP9) {
                (
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_VP9.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: "profile-id=0".to_owned(),
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    98,
                    RTPCodecType::Video,
                )
            } else if spec.mime.eq_ignore_ascii_case(MIME_TYPE_H264) {
                (
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_H264.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line:
                            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f"
                                .to_owned(),
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    102,
                    RTPCodecType::Video,
                )
            } else {
                warn!(mime = %spec.mime, "skipping unsupported codec");
                continue;
            };

        let mut capability = capability;
        if !spec.fmtp_line.is_empty() {
            capability.sdp_fmtp_line = spec.fmtp_line.clone();
        }
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability,
                payload_type,
                ..Default::default()
            },
            codec_type,
        )?;
    }

    Ok(())
}

/// Build a peer connection from the configured codec and ICE settings.
pub async fn new_peer_connection(config: &RtcConfig) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    register_codecs(&mut media_engine, config)?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok(Arc::new(api.new_peer_connection(rtc_config).await?))
}

/// [`PeerSession`] backed by a `webrtc` peer connection.
pub struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcSession {
    /// Build a fresh peer connection for this session.
    pub async fn new(config: &RtcConfig) -> Result<Self> {
        Ok(Self {
            pc: new_peer_connection(config).await?,
        })
    }

    #[must_use]
    pub fn from_peer_connection(pc: Arc<RTCPeerConnection>) -> Self {
        Self { pc }
    }

    #[must_use]
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerSession for WebRtcSession {
    type Transceiver = WebRtcTransceiver;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self.pc.create_offer(options).await?;
        from_engine_description(offer)
            .ok_or_else(|| Error::Signaling("engine produced a non-offer description".to_string()))
    }

    async fn set_local_description(&self, sd: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_engine_description(sd)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_engine_description(sd)?).await?;
        Ok(())
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        let sd = self.pc.remote_description().await?;
        from_engine_description(sd)
    }

    async fn current_remote_description(&self) -> Option<SessionDescription> {
        let sd = self.pc.current_remote_description().await?;
        from_engine_description(sd)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn transceivers(&self) -> Vec<WebRtcTransceiver> {
        self.pc
            .get_transceivers()
            .await
            .into_iter()
            .map(WebRtcTransceiver)
            .collect()
    }

    fn gathering_state(&self) -> GatheringState {
        match self.pc.ice_gathering_state() {
            RTCIceGatheringState::Gathering => GatheringState::Gathering,
            RTCIceGatheringState::Complete => GatheringState::Complete,
            _ => GatheringState::New,
        }
    }

    fn is_closed(&self) -> bool {
        self.pc.connection_state() == RTCPeerConnectionState::Closed
    }

    fn on_gathering_complete(&self, hook: GatheringCompleteHandler) {
        self.pc
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                let hook = Arc::clone(&hook);
                Box::pin(async move {
                    if state == RTCIceGathererState::Complete {
                        hook();
                    }
                })
            }));
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Transceiver handle handed to callers placing subscriber tracks.
#[derive(Clone)]
pub struct WebRtcTransceiver(Arc<RTCRtpTransceiver>);

impl WebRtcTransceiver {
    #[must_use]
    pub fn inner(&self) -> &Arc<RTCRtpTransceiver> {
        &self.0
    }
}

#[async_trait]
impl SessionTransceiver for WebRtcTransceiver {
    fn mid(&self) -> Option<String> {
        self.0.mid().map(|mid| mid.to_string())
    }

    fn kind(&self) -> MediaKind {
        MediaKind::from(self.0.kind())
    }

    async fn sender_slot(&self) -> SenderSlot {
        let sender = self.0.sender().await;
        if sender.track().await.is_some() {
            SenderSlot::Sending
        } else {
            SenderSlot::Empty
        }
    }

    async fn send_codecs(&self) -> Vec<CodecCapability> {
        let sender = self.0.sender().await;
        sender
            .get_parameters()
            .await
            .rtp_parameters
            .codecs
            .into_iter()
            .map(|codec| codec.capability.into())
            .collect()
    }
}

//! Peer connection handle.
//!
//! Wraps `RTCPeerConnection` from webrtc-rs. Engine events are routed to the
//! connection's [`CallbackBridge`] through the signaling thread; SDP and ICE operations
//! run on the network thread and block the caller until they complete.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::stats::StatsReport;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::{NativeConfiguration, SdpSemantics};
use crate::error::{Result, RtcError};
use crate::factory::FactoryCore;
use crate::media::sender::pcmu_track;
use crate::media::{AudioFrameSource, AudioTrackSender};
use crate::observer::{
    CallbackBridge, DataChannelInfo, IceCandidate, ObserverEvent, PeerConnectionState,
    RemoteTrackInfo, SignalingState,
};
use crate::runtime::WorkerHandle;

/// Upper bound on the close performed when a handle is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// SDP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SdpKind {
    Offer = 0,
    PrAnswer = 1,
    Answer = 2,
}

impl SdpKind {
    /// Decode the FFI value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(SdpKind::Offer),
            1 => Some(SdpKind::PrAnswer),
            2 => Some(SdpKind::Answer),
            _ => None,
        }
    }
}

/// A session description exchanged with the remote peer.
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

    fn to_rtc(&self) -> Result<RTCSessionDescription> {
        let sdp = self.sdp.clone();
        let desc = match self.kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp),
            SdpKind::PrAnswer => RTCSessionDescription::pranswer(sdp),
            SdpKind::Answer => RTCSessionDescription::answer(sdp),
        };
        desc.map_err(|e| RtcError::InvalidArgument(format!("invalid sdp: {}", e)))
    }

    fn from_rtc(desc: RTCSessionDescription) -> Result<Self> {
        let kind = match desc.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Pranswer => SdpKind::PrAnswer,
            RTCSdpType::Answer => SdpKind::Answer,
            other => {
                return Err(RtcError::InvalidArgument(format!(
                    "unsupported sdp type {}",
                    other
                )))
            }
        };
        Ok(Self {
            kind,
            sdp: desc.sdp,
        })
    }
}

/// Media kind of a transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MediaKind {
    Audio = 0,
    Video = 1,
}

impl MediaKind {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(MediaKind::Audio),
            1 => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl From<MediaKind> for RTPCodecType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        }
    }
}

/// Negotiated direction of a transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TransceiverDirection {
    SendRecv = 0,
    SendOnly = 1,
    RecvOnly = 2,
    Inactive = 3,
}

impl TransceiverDirection {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(TransceiverDirection::SendRecv),
            1 => Some(TransceiverDirection::SendOnly),
            2 => Some(TransceiverDirection::RecvOnly),
            3 => Some(TransceiverDirection::Inactive),
            _ => None,
        }
    }

    fn from_rtc(direction: RTCRtpTransceiverDirection) -> Option<Self> {
        match direction {
            RTCRtpTransceiverDirection::Sendrecv => Some(TransceiverDirection::SendRecv),
            RTCRtpTransceiverDirection::Sendonly => Some(TransceiverDirection::SendOnly),
            RTCRtpTransceiverDirection::Recvonly => Some(TransceiverDirection::RecvOnly),
            RTCRtpTransceiverDirection::Inactive => Some(TransceiverDirection::Inactive),
            RTCRtpTransceiverDirection::Unspecified => None,
        }
    }
}

impl From<TransceiverDirection> for RTCRtpTransceiverDirection {
    fn from(direction: TransceiverDirection) -> Self {
        match direction {
            TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
            TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
        }
    }
}

/// A transceiver as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransceiverInfo {
    /// Assigned once an offer or answer includes the transceiver
    pub mid: Option<String>,
    pub kind: MediaKind,
    pub direction: TransceiverDirection,
}

impl TransceiverInfo {
    fn from_rtc(transceiver: &RTCRtpTransceiver) -> Option<Self> {
        let kind = match transceiver.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            RTPCodecType::Unspecified => return None,
        };
        Some(Self {
            mid: transceiver.mid().map(|mid| mid.to_string()),
            kind,
            direction: TransceiverDirection::from_rtc(transceiver.direction())?,
        })
    }
}

/// Posts engine events to the signaling thread, which forwards them to the bridge.
#[derive(Clone)]
struct EventDispatch {
    bridge: Arc<CallbackBridge>,
    signaling: WorkerHandle,
}

impl EventDispatch {
    fn raise(&self, event: ObserverEvent) {
        let bridge = Arc::clone(&self.bridge);
        if let Err(e) = self.signaling.post(move || bridge.forward(event)) {
            debug!("event dropped: {}", e);
        }
    }
}

/// Register a handler for every event the engine raises. Each handler holds the bridge.
fn wire_events(pc: &RTCPeerConnection, dispatch: EventDispatch) {
    let d = dispatch.clone();
    pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        d.raise(ObserverEvent::SignalingChange(state.into()));
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        d.raise(ObserverEvent::IceConnectionChange(state.into()));
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        d.raise(ObserverEvent::IceGatheringChange(state.into()));
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        d.raise(ObserverEvent::ConnectionChange(state.into()));
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        match candidate {
            Some(c) => match c.to_json() {
                Ok(init) => d.raise(ObserverEvent::IceCandidate(IceCandidate::from(init))),
                Err(e) => warn!("failed to serialize local candidate: {}", e),
            },
            // end of candidates
            None => d.raise(ObserverEvent::IceGatheringComplete),
        }
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_negotiation_needed(Box::new(move || {
        d.raise(ObserverEvent::NegotiationNeeded);
        Box::pin(async {})
    }));

    let d = dispatch.clone();
    pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        d.raise(ObserverEvent::DataChannel(DataChannelInfo {
            label: channel.label().to_string(),
            id: channel.id(),
        }));
        Box::pin(async {})
    }));

    let d = dispatch;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            d.raise(ObserverEvent::Track(RemoteTrackInfo {
                track_id: track.id(),
                stream_id: track.stream_id(),
                kind: track.kind().to_string(),
            }));
            Box::pin(async {})
        },
    ));
}

/// Replace every handler with a no-op so the engine releases the bridge.
fn unwire_events(pc: &RTCPeerConnection) {
    pc.on_signaling_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_connection_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_gathering_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
    pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
    pc.on_negotiation_needed(Box::new(|| Box::pin(async {})));
    pc.on_data_channel(Box::new(|_| Box::pin(async {})));
    pc.on_track(Box::new(|_, _, _| Box::pin(async {})));
}

/// Host-owned handle to one peer connection.
///
/// Keeps its factory's engine and threads alive. Dropping the handle closes the
/// connection and detaches the observer once queued events have been delivered;
/// engine tasks may still hold the connection briefly afterwards.
pub struct PeerConnectionHandle {
    pc: Arc<RTCPeerConnection>,
    bridge: Arc<CallbackBridge>,
    sdp_semantics: SdpSemantics,
    core: Arc<FactoryCore>,
}

impl PeerConnectionHandle {
    pub(crate) fn new(
        pc: Arc<RTCPeerConnection>,
        bridge: Arc<CallbackBridge>,
        native: NativeConfiguration,
        core: Arc<FactoryCore>,
    ) -> Self {
        wire_events(
            &pc,
            EventDispatch {
                bridge: Arc::clone(&bridge),
                signaling: core.context().signaling().handle(),
            },
        );
        debug!("peer connection created");

        Self {
            pc,
            bridge,
            sdp_semantics: native.sdp_semantics,
            core,
        }
    }

    /// Run an engine operation on the network thread.
    fn run<F, T>(&self, op: impl FnOnce(Arc<RTCPeerConnection>) -> F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, webrtc::Error>> + Send + 'static,
        T: Send + 'static,
    {
        let fut = op(Arc::clone(&self.pc));
        Ok(self.core.context().network().block_on(fut)??)
    }

    pub fn create_offer(&self) -> Result<SessionDescription> {
        let desc = self.run(|pc| async move { pc.create_offer(None).await })?;
        SessionDescription::from_rtc(desc)
    }

    pub fn create_answer(&self) -> Result<SessionDescription> {
        let desc = self.run(|pc| async move { pc.create_answer(None).await })?;
        SessionDescription::from_rtc(desc)
    }

    pub fn set_local_description(&self, desc: &SessionDescription) -> Result<()> {
        let desc = desc.to_rtc()?;
        self.run(|pc| async move { pc.set_local_description(desc).await })
    }

    pub fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        let desc = desc.to_rtc()?;
        self.run(|pc| async move { pc.set_remote_description(desc).await })
    }

    pub fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init: RTCIceCandidateInit = candidate.clone().into();
        self.run(|pc| async move { pc.add_ice_candidate(init).await })
    }

    /// The current local description, including gathered candidates.
    pub fn local_description(&self) -> Result<Option<SessionDescription>> {
        let pc = Arc::clone(&self.pc);
        let desc = self
            .core
            .context()
            .network()
            .block_on(async move { pc.local_description().await })?;
        desc.map(SessionDescription::from_rtc).transpose()
    }

    /// Add an outgoing PCMU track fed by `source`.
    pub fn add_audio_track(
        &self,
        source: &AudioFrameSource,
        track_id: &str,
        stream_id: &str,
    ) -> Result<AudioTrackSender> {
        let track = pcmu_track(track_id, stream_id);
        let local: Arc<dyn TrackLocal + Send + Sync> = track.clone();
        let rtp_sender = self.run(|pc| async move { pc.add_track(local).await })?;

        // drain RTCP so interceptors keep running
        self.core.context().network().spawn_task(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        })?;

        AudioTrackSender::attach(source, track, self.core.context().task_queue_factory())
    }

    /// Add a transceiver with no local track attached.
    pub fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<TransceiverInfo> {
        let init = RTCRtpTransceiverInit {
            direction: direction.into(),
            send_encodings: vec![],
        };
        let transceiver = self.run(|pc| async move {
            pc.add_transceiver_from_kind(kind.into(), Some(init)).await
        })?;
        TransceiverInfo::from_rtc(&transceiver).ok_or_else(|| {
            RtcError::InvalidArgument("engine returned an unspecified transceiver".to_string())
        })
    }

    /// Every transceiver on the connection, in creation order.
    pub fn transceivers(&self) -> Result<Vec<TransceiverInfo>> {
        let pc = Arc::clone(&self.pc);
        let transceivers = self
            .core
            .context()
            .network()
            .block_on(async move { pc.get_transceivers().await })?;
        Ok(transceivers
            .iter()
            .filter_map(|t| TransceiverInfo::from_rtc(t))
            .collect())
    }

    /// Collect a statistics report from the engine.
    pub fn get_stats(&self) -> Result<StatsReport> {
        let pc = Arc::clone(&self.pc);
        self.core
            .context()
            .network()
            .block_on(async move { pc.get_stats().await })
    }

    /// The statistics report as a JSON object keyed by stats id.
    pub fn get_stats_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.get_stats()?)?)
    }

    pub fn close(&self) -> Result<()> {
        self.run(|pc| async move { pc.close().await })
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.pc.signaling_state().into()
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        self.pc.connection_state().into()
    }

    /// ICE servers in the configuration the engine was created with.
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.pc.get_configuration().ice_servers.clone()
    }

    pub fn sdp_semantics(&self) -> SdpSemantics {
        self.sdp_semantics
    }

    /// Observer callbacks delivered so far.
    pub fn events_delivered(&self) -> u64 {
        self.bridge.events_delivered()
    }
}

impl Drop for PeerConnectionHandle {
    fn drop(&mut self) {
        let pc = Arc::clone(&self.pc);
        let network = self.core.context().network();
        let close = async move {
            if let Err(e) = pc.close().await {
                debug!("close on drop failed: {}", e);
            }
        };

        let result = if network.is_current() {
            network.spawn_task(close)
        } else {
            network
                .block_on(async move {
                    if tokio::time::timeout(CLOSE_TIMEOUT, close).await.is_err() {
                        warn!("peer connection close timed out");
                    }
                })
                .map(|_| ())
        };
        if let Err(e) = result {
            debug!("peer connection not closed on drop: {}", e);
        }
        unwire_events(&self.pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdp_kind_raw_values() {
        assert_eq!(SdpKind::from_raw(0), Some(SdpKind::Offer));
        assert_eq!(SdpKind::from_raw(1), Some(SdpKind::PrAnswer));
        assert_eq!(SdpKind::from_raw(2), Some(SdpKind::Answer));
        assert_eq!(SdpKind::from_raw(3), None);
    }

    #[test]
    fn test_transceiver_raw_values() {
        assert_eq!(MediaKind::from_raw(0), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_raw(1), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_raw(2), None);
        assert_eq!(TransceiverDirection::from_raw(2), Some(TransceiverDirection::RecvOnly));
        assert_eq!(TransceiverDirection::from_raw(4), None);
        for raw in 0..4 {
            let direction = TransceiverDirection::from_raw(raw).unwrap();
            let rtc: RTCRtpTransceiverDirection = direction.into();
            assert_eq!(TransceiverDirection::from_rtc(rtc), Some(direction));
        }
        assert_eq!(
            TransceiverDirection::from_rtc(RTCRtpTransceiverDirection::Unspecified),
            None
        );
    }

    #[test]
    fn test_unparsable_sdp_is_invalid_argument() {
        let desc = SessionDescription::offer("not an sdp");
        assert!(matches!(desc.to_rtc(), Err(RtcError::InvalidArgument(_))));
    }
}

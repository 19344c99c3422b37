//! Host callback objects and the bridge that forwards engine events to them.
//!
//! The host hands exactly one [`PeerConnectionObserver`] to each peer connection. The
//! [`CallbackBridge`] takes ownership of it and is itself shared with the engine's event
//! handlers, so it lives for as long as the engine can still raise events, regardless of
//! what the host does with its connection handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

use crate::error::{Result, RtcError};

/// Error an observer may return from [`PeerConnectionObserver::attach`].
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Signaling state (values are the FFI encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SignalingState {
    Unspecified = 0,
    Stable = 1,
    HaveLocalOffer = 2,
    HaveRemoteOffer = 3,
    HaveLocalPranswer = 4,
    HaveRemotePranswer = 5,
    Closed = 6,
}

impl From<RTCSignalingState> for SignalingState {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::Unspecified => SignalingState::Unspecified,
            RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
        }
    }
}

/// ICE connection state (values are the FFI encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IceConnectionState {
    Unspecified = 0,
    New = 1,
    Checking = 2,
    Connected = 3,
    Completed = 4,
    Disconnected = 5,
    Failed = 6,
    Closed = 7,
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified => IceConnectionState::Unspecified,
            RTCIceConnectionState::New => IceConnectionState::New,
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
        }
    }
}

/// ICE gathering state (values are the FFI encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IceGatheringState {
    Unspecified = 0,
    New = 1,
    Gathering = 2,
    Complete = 3,
    Closed = 4,
}

impl From<RTCIceGathererState> for IceGatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::Unspecified => IceGatheringState::Unspecified,
            RTCIceGathererState::New => IceGatheringState::New,
            RTCIceGathererState::Gathering => IceGatheringState::Gathering,
            RTCIceGathererState::Complete => IceGatheringState::Complete,
            RTCIceGathererState::Closed => IceGatheringState::Closed,
        }
    }
}

/// Peer connection state (values are the FFI encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PeerConnectionState {
    Unspecified = 0,
    New = 1,
    Connecting = 2,
    Connected = 3,
    Disconnected = 4,
    Failed = 5,
    Closed = 6,
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified => PeerConnectionState::Unspecified,
            RTCPeerConnectionState::New => PeerConnectionState::New,
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        }
    }
}

/// ICE candidate for signaling
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        }
    }
}

/// A data channel opened by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInfo {
    pub label: String,
    pub id: u16,
}

/// A media track announced by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub track_id: String,
    pub stream_id: String,
    pub kind: String,
}

/// Every event the engine can raise for one peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    SignalingChange(SignalingState),
    IceConnectionChange(IceConnectionState),
    IceGatheringChange(IceGatheringState),
    ConnectionChange(PeerConnectionState),
    IceCandidate(IceCandidate),
    IceGatheringComplete,
    NegotiationNeeded,
    DataChannel(DataChannelInfo),
    Track(RemoteTrackInfo),
}

/// Host callback object for one peer connection.
///
/// Methods are invoked on the signaling thread, one at a time, in the order the engine
/// raised the events. Implementations must not block for long.
pub trait PeerConnectionObserver: Send + 'static {
    /// Called once when the bridge takes ownership. An error aborts connection creation.
    fn attach(&mut self) -> std::result::Result<(), ObserverError> {
        Ok(())
    }

    fn on_signaling_change(&mut self, _state: SignalingState) {}

    fn on_ice_connection_change(&mut self, _state: IceConnectionState) {}

    fn on_ice_gathering_change(&mut self, _state: IceGatheringState) {}

    fn on_connection_change(&mut self, _state: PeerConnectionState) {}

    fn on_ice_candidate(&mut self, _candidate: IceCandidate) {}

    /// The engine has no more local candidates to report.
    fn on_ice_gathering_complete(&mut self) {}

    fn on_negotiation_needed(&mut self) {}

    fn on_data_channel(&mut self, _channel: DataChannelInfo) {}

    fn on_track(&mut self, _track: RemoteTrackInfo) {}

    /// Called once when the bridge is released, after the last event. The bridge does
    /// not call it if `attach` failed; the observer is simply dropped, so resources
    /// owned by the observer itself belong in its `Drop`.
    fn detach(&mut self) {}
}

/// Owns one host observer and forwards engine events to it.
pub struct CallbackBridge {
    observer: Mutex<Box<dyn PeerConnectionObserver>>,
    delivered: AtomicU64,
}

impl CallbackBridge {
    /// Take ownership of `observer`. If its `attach` hook fails the observer is dropped
    /// and connection creation fails.
    pub fn new(mut observer: Box<dyn PeerConnectionObserver>) -> Result<Arc<Self>> {
        if let Err(e) = observer.attach() {
            warn!("observer rejected attachment: {}", e);
            return Err(RtcError::ConnectionCreation(format!(
                "observer rejected attachment: {}",
                e
            )));
        }

        Ok(Arc::new(Self {
            observer: Mutex::new(observer),
            delivered: AtomicU64::new(0),
        }))
    }

    /// Deliver one event to the observer.
    pub fn forward(&self, event: ObserverEvent) {
        let mut observer = self.observer.lock();
        match event {
            ObserverEvent::SignalingChange(state) => observer.on_signaling_change(state),
            ObserverEvent::IceConnectionChange(state) => observer.on_ice_connection_change(state),
            ObserverEvent::IceGatheringChange(state) => observer.on_ice_gathering_change(state),
            ObserverEvent::ConnectionChange(state) => observer.on_connection_change(state),
            ObserverEvent::IceCandidate(candidate) => observer.on_ice_candidate(candidate),
            ObserverEvent::IceGatheringComplete => observer.on_ice_gathering_complete(),
            ObserverEvent::NegotiationNeeded => observer.on_negotiation_needed(),
            ObserverEvent::DataChannel(channel) => observer.on_data_channel(channel),
            ObserverEvent::Track(track) => observer.on_track(track),
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of events delivered so far.
    pub fn events_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for CallbackBridge {
    fn drop(&mut self) {
        self.observer.get_mut().detach();
        debug!(
            "callback bridge released after {} events",
            self.delivered.load(Ordering::Relaxed)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Records every callback as the event it came from.
    struct Recorder {
        seen: Arc<Mutex<Vec<ObserverEvent>>>,
        drops: Arc<AtomicUsize>,
        detached: usize,
        reject: bool,
    }

    impl Recorder {
        fn new(reject: bool) -> (Self, Arc<Mutex<Vec<ObserverEvent>>>, Arc<AtomicUsize>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let drops = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    seen: Arc::clone(&seen),
                    drops: Arc::clone(&drops),
                    detached: 0,
                    reject,
                },
                seen,
                drops,
            )
        }
    }

    impl Drop for Recorder {
        fn drop(&mut self) {
            // hundreds digit counts detach calls seen before the drop
            self.drops.fetch_add(1 + self.detached * 100, Ordering::SeqCst);
        }
    }

    impl PeerConnectionObserver for Recorder {
        fn attach(&mut self) -> std::result::Result<(), ObserverError> {
            if self.reject {
                Err("not ready".into())
            } else {
                Ok(())
            }
        }

        fn on_signaling_change(&mut self, state: SignalingState) {
            self.seen.lock().push(ObserverEvent::SignalingChange(state));
        }

        fn on_ice_connection_change(&mut self, state: IceConnectionState) {
            self.seen.lock().push(ObserverEvent::IceConnectionChange(state));
        }

        fn on_ice_gathering_change(&mut self, state: IceGatheringState) {
            self.seen.lock().push(ObserverEvent::IceGatheringChange(state));
        }

        fn on_connection_change(&mut self, state: PeerConnectionState) {
            self.seen.lock().push(ObserverEvent::ConnectionChange(state));
        }

        fn on_ice_candidate(&mut self, candidate: IceCandidate) {
            self.seen.lock().push(ObserverEvent::IceCandidate(candidate));
        }

        fn on_ice_gathering_complete(&mut self) {
            self.seen.lock().push(ObserverEvent::IceGatheringComplete);
        }

        fn on_negotiation_needed(&mut self) {
            self.seen.lock().push(ObserverEvent::NegotiationNeeded);
        }

        fn on_data_channel(&mut self, channel: DataChannelInfo) {
            self.seen.lock().push(ObserverEvent::DataChannel(channel));
        }

        fn on_track(&mut self, track: RemoteTrackInfo) {
            self.seen.lock().push(ObserverEvent::Track(track));
        }

        fn detach(&mut self) {
            self.detached += 1;
        }
    }

    #[test]
    fn test_each_event_reaches_its_method_once_in_order() {
        let (recorder, seen, drops) = Recorder::new(false);
        let bridge = CallbackBridge::new(Box::new(recorder)).unwrap();

        let events = vec![
            ObserverEvent::NegotiationNeeded,
            ObserverEvent::SignalingChange(SignalingState::HaveLocalOffer),
            ObserverEvent::IceGatheringChange(IceGatheringState::Gathering),
            ObserverEvent::IceCandidate(IceCandidate {
                candidate: "candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            }),
            ObserverEvent::IceGatheringComplete,
            ObserverEvent::IceConnectionChange(IceConnectionState::Checking),
            ObserverEvent::ConnectionChange(PeerConnectionState::Connecting),
            ObserverEvent::DataChannel(DataChannelInfo {
                label: "chat".to_string(),
                id: 1,
            }),
            ObserverEvent::Track(RemoteTrackInfo {
                track_id: "audio0".to_string(),
                stream_id: "stream0".to_string(),
                kind: "audio".to_string(),
            }),
        ];
        for event in events.clone() {
            bridge.forward(event);
        }

        assert_eq!(*seen.lock(), events);
        assert_eq!(bridge.events_delivered(), events.len() as u64);

        drop(bridge);
        // dropped once, detached once beforehand
        assert_eq!(drops.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn test_rejected_attach_drops_observer() {
        let (recorder, seen, drops) = Recorder::new(true);
        let result = CallbackBridge::new(Box::new(recorder));
        assert!(matches!(result, Err(RtcError::ConnectionCreation(_))));
        // dropped once, never detached
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_concurrent_forwarding_delivers_every_event() {
        let (recorder, seen, _drops) = Recorder::new(false);
        let bridge = CallbackBridge::new(Box::new(recorder)).unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        bridge.forward(ObserverEvent::NegotiationNeeded);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(seen.lock().len(), 1000);
        assert_eq!(bridge.events_delivered(), 1000);
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            SignalingState::from(RTCSignalingState::HaveRemoteOffer),
            SignalingState::HaveRemoteOffer
        );
        assert_eq!(
            PeerConnectionState::from(RTCPeerConnectionState::Failed) as u32,
            5
        );
        assert_eq!(
            IceGatheringState::from(RTCIceGathererState::Complete),
            IceGatheringState::Complete
        );
        assert_eq!(
            IceConnectionState::from(RTCIceConnectionState::Disconnected) as u32,
            5
        );
    }

    #[test]
    fn test_candidate_conversion_keeps_fields() {
        let candidate = IceCandidate {
            candidate: "candidate:2 1 udp 1 192.0.2.1 3478 typ srflx".to_string(),
            sdp_mid: Some("audio".to_string()),
            sdp_mline_index: Some(1),
        };
        let init: RTCIceCandidateInit = candidate.clone().into();
        assert_eq!(init.username_fragment, None);
        assert_eq!(IceCandidate::from(init), candidate);
    }
}

//! C ABI for non-Rust hosts.
//!
//! Handles are opaque pointers created by `*_create` functions and released by the
//! matching `*_free`. Functions returning `i32` return 1 on success and 0 on failure;
//! pointer-returning functions return null on failure. After a failure
//! [`rtc_last_error`] describes it.
//!
//! Strings returned to the host are owned by the host and must be released with
//! [`rtc_string_free`].

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

use log::warn;

use crate::config::{ConnectionConfig, IceServerDescriptor, SdpSemantics};
use crate::error::{Result, RtcError};
use crate::factory::{create_factory, EngineFactory};
use crate::media::{AudioFrameSource, AudioTrackSender};
use crate::observer::{
    DataChannelInfo, IceCandidate, IceConnectionState, IceGatheringState, ObserverError,
    PeerConnectionObserver, PeerConnectionState, RemoteTrackInfo, SignalingState,
};
use crate::peer::{
    MediaKind, PeerConnectionHandle, SdpKind, SessionDescription, TransceiverDirection,
};

// ============================================================================
// Last error
// ============================================================================

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: String) {
    warn!("{}", message);
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Record `result`'s error, if any, and convert it to an option.
fn report<T>(context: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            set_last_error(format!("{}: {}", context, e));
            None
        }
    }
}

/// Message of the last failure on the calling thread, or null. Valid until the next
/// failing call on the same thread.
#[no_mangle]
pub extern "C" fn rtc_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Release a string returned by this library.
///
/// # Safety
/// `s` must be null or a string returned by this library that was not freed yet.
#[no_mangle]
pub unsafe extern "C" fn rtc_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(s) => s.into_raw(),
        Err(_) => {
            set_last_error("string contains an interior nul byte".to_string());
            ptr::null_mut()
        }
    }
}

/// Required string argument.
unsafe fn str_arg(p: *const c_char, name: &str) -> Result<String> {
    if p.is_null() {
        return Err(RtcError::InvalidArgument(format!("{} is null", name)));
    }
    Ok(CStr::from_ptr(p).to_string_lossy().into_owned())
}

/// Optional string argument, null meaning absent.
unsafe fn opt_str_arg(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

unsafe fn handle_ref<'a, T>(p: *const T, name: &str) -> Result<&'a T> {
    p.as_ref()
        .ok_or_else(|| RtcError::InvalidArgument(format!("{} handle is null", name)))
}

// ============================================================================
// Configuration
// ============================================================================

/// One ICE server
#[repr(C)]
pub struct RtcIceServerFFI {
    /// Array of `url_count` server URLs
    pub urls: *const *const c_char,
    pub url_count: usize,
    /// TURN username, may be null
    pub username: *const c_char,
    /// TURN credential, may be null
    pub password: *const c_char,
}

/// Connection configuration
#[repr(C)]
pub struct RtcConnectionConfigFFI {
    /// 0 = plan-b, 1 = unified-plan
    pub sdp_semantics: u32,
    /// Array of `ice_server_count` servers
    pub ice_servers: *const RtcIceServerFFI,
    pub ice_server_count: usize,
}

/// Copy a C configuration. Null means the default configuration.
unsafe fn config_from_ffi(config: *const RtcConnectionConfigFFI) -> Result<ConnectionConfig> {
    let Some(config) = config.as_ref() else {
        return Ok(ConnectionConfig::default());
    };

    let sdp_semantics = SdpSemantics::from_raw(config.sdp_semantics).ok_or_else(|| {
        RtcError::InvalidArgument(format!("unknown sdp semantics {}", config.sdp_semantics))
    })?;

    if config.ice_servers.is_null() && config.ice_server_count > 0 {
        return Err(RtcError::InvalidArgument("ice_servers is null".to_string()));
    }

    let mut ice_servers = Vec::with_capacity(config.ice_server_count);
    for i in 0..config.ice_server_count {
        let server = &*config.ice_servers.add(i);
        if server.urls.is_null() && server.url_count > 0 {
            return Err(RtcError::InvalidArgument(format!("ice server {} urls is null", i)));
        }

        let mut urls = Vec::with_capacity(server.url_count);
        for j in 0..server.url_count {
            urls.push(str_arg(*server.urls.add(j), "ice server url")?);
        }

        ice_servers.push(IceServerDescriptor {
            urls,
            username: opt_str_arg(server.username).unwrap_or_default(),
            password: opt_str_arg(server.password).unwrap_or_default(),
        });
    }

    Ok(ConnectionConfig {
        sdp_semantics,
        ice_servers,
    })
}

// ============================================================================
// Observer callbacks
// ============================================================================

/// Returns 0 to accept the connection, anything else to refuse it.
pub type AttachCallback = unsafe extern "C" fn(user: *mut c_void) -> i32;

pub type NotifyCallback = unsafe extern "C" fn(user: *mut c_void);

/// State values are the `#[repr(u32)]` encodings of the observer state enums.
pub type StateCallback = unsafe extern "C" fn(state: u32, user: *mut c_void);

/// `sdp_mid` may be null; `sdp_mline_index` is -1 when absent.
pub type IceCandidateCallback = unsafe extern "C" fn(
    candidate: *const c_char,
    sdp_mid: *const c_char,
    sdp_mline_index: i32,
    user: *mut c_void,
);

pub type DataChannelCallback =
    unsafe extern "C" fn(label: *const c_char, id: u16, user: *mut c_void);

pub type TrackCallback = unsafe extern "C" fn(
    track_id: *const c_char,
    stream_id: *const c_char,
    kind: *const c_char,
    user: *mut c_void,
);

/// Observer callback table (FFI-safe). Every callback is optional.
///
/// Callbacks run on the factory's signaling thread. `detach` runs exactly once for
/// every table passed to `rtc_factory_create_peer_connection`, including when creation
/// fails and when `attach` refused, and is the place to release `user_data`. The
/// adapter calls it from its own drop in those cases, so unlike
/// [`PeerConnectionObserver::detach`] it does not depend on a successful `attach`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RtcObserverCallbacks {
    pub user_data: *mut c_void,
    pub attach: Option<AttachCallback>,
    pub detach: Option<NotifyCallback>,
    pub on_signaling_change: Option<StateCallback>,
    pub on_ice_connection_change: Option<StateCallback>,
    pub on_ice_gathering_change: Option<StateCallback>,
    pub on_connection_change: Option<StateCallback>,
    pub on_ice_candidate: Option<IceCandidateCallback>,
    pub on_ice_gathering_complete: Option<NotifyCallback>,
    pub on_negotiation_needed: Option<NotifyCallback>,
    pub on_data_channel: Option<DataChannelCallback>,
    pub on_track: Option<TrackCallback>,
}

/// Adapts a callback table to [`PeerConnectionObserver`].
struct CallbackObserver {
    callbacks: RtcObserverCallbacks,
    detached: bool,
}

// Safety: callbacks are function pointers, user_data is opaque and the host promises
// it may be used from the signaling thread
unsafe impl Send for CallbackObserver {}

impl CallbackObserver {
    fn new(callbacks: RtcObserverCallbacks) -> Self {
        Self {
            callbacks,
            detached: false,
        }
    }

    fn release(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(callback) = self.callbacks.detach {
            unsafe { callback(self.callbacks.user_data) };
        }
    }

    fn state(&self, callback: Option<StateCallback>, state: u32) {
        if let Some(callback) = callback {
            unsafe { callback(state, self.callbacks.user_data) };
        }
    }

    fn notify(&self, callback: Option<NotifyCallback>) {
        if let Some(callback) = callback {
            unsafe { callback(self.callbacks.user_data) };
        }
    }
}

impl Drop for CallbackObserver {
    fn drop(&mut self) {
        self.release();
    }
}

impl PeerConnectionObserver for CallbackObserver {
    fn attach(&mut self) -> std::result::Result<(), ObserverError> {
        let Some(callback) = self.callbacks.attach else {
            return Ok(());
        };
        match unsafe { callback(self.callbacks.user_data) } {
            0 => Ok(()),
            code => Err(format!("attach callback returned {}", code).into()),
        }
    }

    fn on_signaling_change(&mut self, state: SignalingState) {
        self.state(self.callbacks.on_signaling_change, state as u32);
    }

    fn on_ice_connection_change(&mut self, state: IceConnectionState) {
        self.state(self.callbacks.on_ice_connection_change, state as u32);
    }

    fn on_ice_gathering_change(&mut self, state: IceGatheringState) {
        self.state(self.callbacks.on_ice_gathering_change, state as u32);
    }

    fn on_connection_change(&mut self, state: PeerConnectionState) {
        self.state(self.callbacks.on_connection_change, state as u32);
    }

    fn on_ice_candidate(&mut self, candidate: IceCandidate) {
        let Some(callback) = self.callbacks.on_ice_candidate else {
            return;
        };
        let Ok(candidate_cstr) = CString::new(candidate.candidate) else {
            return;
        };
        let sdp_mid_cstr = candidate.sdp_mid.and_then(|s| CString::new(s).ok());
        let sdp_mid_ptr = sdp_mid_cstr
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null());
        let index = candidate.sdp_mline_index.map(i32::from).unwrap_or(-1);

        unsafe {
            callback(
                candidate_cstr.as_ptr(),
                sdp_mid_ptr,
                index,
                self.callbacks.user_data,
            )
        };
    }

    fn on_ice_gathering_complete(&mut self) {
        self.notify(self.callbacks.on_ice_gathering_complete);
    }

    fn on_negotiation_needed(&mut self) {
        self.notify(self.callbacks.on_negotiation_needed);
    }

    fn on_data_channel(&mut self, channel: DataChannelInfo) {
        if let (Some(callback), Ok(label)) =
            (self.callbacks.on_data_channel, CString::new(channel.label))
        {
            unsafe { callback(label.as_ptr(), channel.id, self.callbacks.user_data) };
        }
    }

    fn on_track(&mut self, track: RemoteTrackInfo) {
        let Some(callback) = self.callbacks.on_track else {
            return;
        };
        if let (Ok(id), Ok(stream), Ok(kind)) = (
            CString::new(track.track_id),
            CString::new(track.stream_id),
            CString::new(track.kind),
        ) {
            unsafe {
                callback(
                    id.as_ptr(),
                    stream.as_ptr(),
                    kind.as_ptr(),
                    self.callbacks.user_data,
                )
            };
        }
    }

    fn detach(&mut self) {
        self.release();
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create an engine factory with default options. Null on failure.
#[no_mangle]
pub extern "C" fn rtc_factory_create() -> *mut EngineFactory {
    match report("rtc_factory_create", create_factory()) {
        Some(factory) => Box::into_raw(Box::new(factory)),
        None => ptr::null_mut(),
    }
}

/// Release the host's factory handle. Threads stop once every connection created from
/// it has been freed as well.
///
/// # Safety
/// `factory` must be null or a live handle from [`rtc_factory_create`].
#[no_mangle]
pub unsafe extern "C" fn rtc_factory_free(factory: *mut EngineFactory) {
    if !factory.is_null() {
        drop(Box::from_raw(factory));
    }
}

/// Create a peer connection. `config` may be null for the default configuration.
///
/// The callback table is copied; its `detach` runs exactly once even on failure.
///
/// # Safety
/// Pointers must be null or valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rtc_factory_create_peer_connection(
    factory: *const EngineFactory,
    config: *const RtcConnectionConfigFFI,
    callbacks: *const RtcObserverCallbacks,
) -> *mut PeerConnectionHandle {
    let Some(callbacks) = callbacks.as_ref() else {
        set_last_error("rtc_factory_create_peer_connection: callbacks is null".to_string());
        return ptr::null_mut();
    };
    // owned from here on, so every early return releases user_data
    let observer = Box::new(CallbackObserver::new(*callbacks));

    let result = handle_ref(factory, "factory").and_then(|factory| {
        let config = config_from_ffi(config)?;
        factory.create_peer_connection(&config, observer)
    });

    match report("rtc_factory_create_peer_connection", result) {
        Some(pc) => Box::into_raw(Box::new(pc)),
        None => ptr::null_mut(),
    }
}

// ============================================================================
// Peer connection
// ============================================================================

/// Close and release a peer connection.
///
/// # Safety
/// `pc` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_free(pc: *mut PeerConnectionHandle) {
    if !pc.is_null() {
        drop(Box::from_raw(pc));
    }
}

/// Create an SDP offer. Returns the SDP, to be freed with [`rtc_string_free`].
///
/// # Safety
/// `pc` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_create_offer(
    pc: *const PeerConnectionHandle,
) -> *mut c_char {
    let result = handle_ref(pc, "peer connection").and_then(|pc| pc.create_offer());
    match report("rtc_peer_connection_create_offer", result) {
        Some(desc) => into_c_string(desc.sdp),
        None => ptr::null_mut(),
    }
}

/// Create an SDP answer. Returns the SDP, to be freed with [`rtc_string_free`].
///
/// # Safety
/// `pc` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_create_answer(
    pc: *const PeerConnectionHandle,
) -> *mut c_char {
    let result = handle_ref(pc, "peer connection").and_then(|pc| pc.create_answer());
    match report("rtc_peer_connection_create_answer", result) {
        Some(desc) => into_c_string(desc.sdp),
        None => ptr::null_mut(),
    }
}

unsafe fn description_arg(kind: u32, sdp: *const c_char) -> Result<SessionDescription> {
    let kind = SdpKind::from_raw(kind)
        .ok_or_else(|| RtcError::InvalidArgument(format!("unknown sdp kind {}", kind)))?;
    Ok(SessionDescription {
        kind,
        sdp: str_arg(sdp, "sdp")?,
    })
}

/// Set the local description. `kind`: 0 = offer, 1 = pranswer, 2 = answer.
///
/// # Safety
/// Pointers must be null or valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_set_local_description(
    pc: *const PeerConnectionHandle,
    kind: u32,
    sdp: *const c_char,
) -> i32 {
    let result = handle_ref(pc, "peer connection")
        .and_then(|pc| pc.set_local_description(&description_arg(kind, sdp)?));
    report("rtc_peer_connection_set_local_description", result).is_some() as i32
}

/// Set the remote description. `kind`: 0 = offer, 1 = pranswer, 2 = answer.
///
/// # Safety
/// Pointers must be null or valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_set_remote_description(
    pc: *const PeerConnectionHandle,
    kind: u32,
    sdp: *const c_char,
) -> i32 {
    let result = handle_ref(pc, "peer connection")
        .and_then(|pc| pc.set_remote_description(&description_arg(kind, sdp)?));
    report("rtc_peer_connection_set_remote_description", result).is_some() as i32
}

/// Add a remote ICE candidate. `sdp_mid` may be null; a negative `sdp_mline_index`
/// means absent.
///
/// # Safety
/// Pointers must be null or valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_add_ice_candidate(
    pc: *const PeerConnectionHandle,
    candidate: *const c_char,
    sdp_mid: *const c_char,
    sdp_mline_index: i32,
) -> i32 {
    let result = handle_ref(pc, "peer connection").and_then(|pc| {
        let candidate = IceCandidate {
            candidate: str_arg(candidate, "candidate")?,
            sdp_mid: opt_str_arg(sdp_mid),
            sdp_mline_index: u16::try_from(sdp_mline_index).ok(),
        };
        pc.add_ice_candidate(&candidate)
    });
    report("rtc_peer_connection_add_ice_candidate", result).is_some() as i32
}

/// Send `source` on a new outgoing audio track. Returns a sender handle to free with
/// [`rtc_audio_sender_free`].
///
/// # Safety
/// Pointers must be null or valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_add_audio_track(
    pc: *const PeerConnectionHandle,
    source: *const AudioFrameSource,
    track_id: *const c_char,
    stream_id: *const c_char,
) -> *mut AudioTrackSender {
    let result = handle_ref(pc, "peer connection").and_then(|pc| {
        let source = handle_ref(source, "audio source")?;
        let track_id = str_arg(track_id, "track_id")?;
        let stream_id = str_arg(stream_id, "stream_id")?;
        pc.add_audio_track(source, &track_id, &stream_id)
    });
    match report("rtc_peer_connection_add_audio_track", result) {
        Some(sender) => Box::into_raw(Box::new(sender)),
        None => ptr::null_mut(),
    }
}

/// Add a transceiver with no local track. `kind`: 0 = audio, 1 = video. `direction`:
/// 0 = sendrecv, 1 = sendonly, 2 = recvonly, 3 = inactive.
///
/// # Safety
/// `pc` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_add_transceiver(
    pc: *const PeerConnectionHandle,
    kind: u32,
    direction: u32,
) -> i32 {
    let result = handle_ref(pc, "peer connection").and_then(|pc| {
        let kind = MediaKind::from_raw(kind)
            .ok_or_else(|| RtcError::InvalidArgument(format!("unknown media kind {}", kind)))?;
        let direction = TransceiverDirection::from_raw(direction).ok_or_else(|| {
            RtcError::InvalidArgument(format!("unknown transceiver direction {}", direction))
        })?;
        pc.add_transceiver(kind, direction)
    });
    report("rtc_peer_connection_add_transceiver", result).is_some() as i32
}

/// Collect statistics as a JSON object keyed by stats id. Returns a string to free with
/// [`rtc_string_free`].
///
/// # Safety
/// `pc` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_peer_connection_get_stats(
    pc: *const PeerConnectionHandle,
) -> *mut c_char {
    let result = handle_ref(pc, "peer connection").and_then(|pc| pc.get_stats_json());
    match report("rtc_peer_connection_get_stats", result) {
        Some(json) => into_c_string(json),
        None => ptr::null_mut(),
    }
}

/// Detach and release an audio sender.
///
/// # Safety
/// `sender` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_audio_sender_free(sender: *mut AudioTrackSender) {
    if !sender.is_null() {
        drop(Box::from_raw(sender));
    }
}

// ============================================================================
// Audio source
// ============================================================================

#[no_mangle]
pub extern "C" fn rtc_audio_source_create() -> *mut AudioFrameSource {
    Box::into_raw(Box::new(AudioFrameSource::new()))
}

/// Release the host's reference. Senders attached to the source keep it alive.
///
/// # Safety
/// `source` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_audio_source_free(source: *mut AudioFrameSource) {
    if !source.is_null() {
        drop(Box::from_raw(source));
    }
}

/// Push `len` bytes of interleaved big-endian 16-bit PCM.
///
/// # Safety
/// `source` must be null or a live handle; `data` must be valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn rtc_audio_source_push_raw_s16be(
    source: *const AudioFrameSource,
    data: *const u8,
    len: usize,
    sample_rate: i32,
    channels: u32,
    frames: u32,
) -> i32 {
    let result = handle_ref(source, "audio source").and_then(|source| {
        if data.is_null() && len > 0 {
            return Err(RtcError::InvalidArgument("data is null".to_string()));
        }
        let bytes = if len == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(data, len)
        };
        source.push_raw_s16be(bytes, sample_rate, channels as usize, frames as usize);
        Ok(())
    });
    report("rtc_audio_source_push_raw_s16be", result).is_some() as i32
}

/// Push 10 ms of a 440 Hz tone.
///
/// # Safety
/// `source` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn rtc_audio_source_push_zeroed_data(
    source: *const AudioFrameSource,
    sample_rate: i32,
    channels: u32,
) -> i32 {
    let result = handle_ref(source, "audio source").map(|source| {
        source.push_zeroed_data(sample_rate, channels as usize);
    });
    report("rtc_audio_source_push_zeroed_data", result).is_some() as i32
}

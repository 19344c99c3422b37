//! rtc-binding: host bindings for a WebRTC engine.
//!
//! Owns the engine's threads, builds peer connections against them, forwards engine
//! events to host observers and feeds host PCM into the outgoing audio pipeline.
//!
//! ## Features
//!
//! - **Execution context**: dedicated network, signaling and worker threads
//! - **Callback bridge**: one owned observer per connection, events delivered in order
//! - **Audio ingestion**: big-endian PCM frames or a synthetic 10 ms 440 Hz tone
//! - **PCMU sender**: frames encoded to G.711 mu-law on a high-priority queue
//! - **C ABI**: opaque handles and callback tables for non-Rust hosts
//!
//! ## Example
//!
//! ```no_run
//! use rtc_binding::{create_factory, ConnectionConfig, PeerConnectionObserver};
//!
//! struct Log;
//! impl PeerConnectionObserver for Log {}
//!
//! let factory = create_factory()?;
//! let pc = factory.create_peer_connection(&ConnectionConfig::default(), Box::new(Log))?;
//! let source = factory.create_audio_track_source();
//! let _sender = pc.add_audio_track(&source, "audio", "stream")?;
//! source.push_zeroed_data(48000, 2);
//! # Ok::<(), rtc_binding::RtcError>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod factory;
pub mod ffi;
pub mod logging;
pub mod media;
pub mod observer;
pub mod peer;
pub mod runtime;

pub use config::{
    google_stun_servers, ConnectionConfig, FactoryOptions, IceServerDescriptor,
    NativeConfiguration, SdpSemantics,
};
pub use device::AudioDeviceStub;
pub use error::{Result, RtcError};
pub use factory::{create_factory, create_factory_with, EngineFactory};
pub use media::{
    create_audio_track_source, tone_frame, AudioFrame, AudioFrameSource, AudioSink,
    AudioTrackSender, SenderStatsSnapshot, SinkId,
};
pub use observer::{
    CallbackBridge, DataChannelInfo, IceCandidate, IceConnectionState, IceGatheringState,
    ObserverError, ObserverEvent, PeerConnectionObserver, PeerConnectionState,
    RemoteTrackInfo, SignalingState,
};
pub use peer::{
    MediaKind, PeerConnectionHandle, SdpKind, SessionDescription, TransceiverDirection,
    TransceiverInfo,
};
pub use runtime::{
    live_worker_threads, ExecutionContext, TaskQueue, TaskQueueFactory, TaskQueuePriority,
    WorkerHandle, WorkerThread,
};

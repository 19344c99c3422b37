//! Audio ingestion and the outgoing audio pipeline.

pub mod frame;
pub mod g711;
pub mod sender;
pub mod source;

pub use frame::AudioFrame;
pub use sender::{AudioTrackSender, SenderStatsSnapshot};
pub use source::{create_audio_track_source, tone_frame, AudioFrameSource, AudioSink, SinkId};

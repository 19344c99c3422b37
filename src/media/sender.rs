//! Audio track sender: source frames -> PCMU -> engine track.
//!
//! The sender registers itself as a sink on an [`AudioFrameSource`]. Pushing threads only
//! hand frames over a channel; encoding and the async track write happen on a dedicated
//! high-priority encoder queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::api::media_engine::MIME_TYPE_PCMU;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::frame::AudioFrame;
use super::g711::{PcmuEncoder, PCMU_SAMPLE_RATE};
use super::source::{AudioFrameSource, AudioSink, SinkId};
use crate::error::Result;
use crate::runtime::{TaskQueue, TaskQueueFactory, TaskQueuePriority};

/// Sender statistics
#[derive(Default)]
pub struct SenderStats {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub write_errors: AtomicU64,
}

/// Statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub malformed_frames: u64,
    pub write_errors: u64,
}

/// Build the PCMU track a sender writes into.
pub fn pcmu_track(track_id: &str, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_PCMU.to_owned(),
            clock_rate: PCMU_SAMPLE_RATE,
            channels: 1,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        track_id.to_owned(),
        stream_id.to_owned(),
    ))
}

/// Hands frames from pushing threads to the encoder task.
struct ChannelSink {
    tx: mpsc::UnboundedSender<AudioFrame>,
}

impl AudioSink for ChannelSink {
    fn on_data(&self, frame: &AudioFrame) {
        // the encoder task is gone once the sender is detached
        let _ = self.tx.send(frame.clone());
    }
}

/// Feeds one [`AudioFrameSource`] into one engine audio track.
pub struct AudioTrackSender {
    source: AudioFrameSource,
    sink: Mutex<Option<SinkId>>,
    queue: TaskQueue,
    track: Arc<TrackLocalStaticSample>,
    stats: Arc<SenderStats>,
}

impl AudioTrackSender {
    /// Start an encoder queue and register on `source`.
    pub fn attach(
        source: &AudioFrameSource,
        track: Arc<TrackLocalStaticSample>,
        queues: &TaskQueueFactory,
    ) -> Result<Self> {
        let queue = queues.create_task_queue("rtc-audio-encoder", TaskQueuePriority::High)?;
        let stats = Arc::new(SenderStats::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<AudioFrame>();

        let task_track = Arc::clone(&track);
        let task_stats = Arc::clone(&stats);
        queue.spawn(async move {
            let encoder = PcmuEncoder::new();
            while let Some(frame) = rx.recv().await {
                if !frame.is_well_formed() {
                    warn!(
                        "dropping malformed frame: {} samples for {} frames x {} channels @ {} Hz",
                        frame.samples.len(),
                        frame.frames,
                        frame.channels,
                        frame.sample_rate
                    );
                    task_stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let payload = encoder.encode(&frame);
                let len = payload.len();
                let sample = Sample {
                    data: Bytes::from(payload),
                    duration: frame.duration(),
                    ..Default::default()
                };

                match task_track.write_sample(&sample).await {
                    Ok(()) => {
                        task_stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                        task_stats.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        debug!("audio track write failed: {}", e);
                        task_stats.write_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })?;

        let sink_id = source.add_sink(Arc::new(ChannelSink { tx }));
        debug!("audio sender attached on {}", queue.name());

        Ok(Self {
            source: source.clone(),
            sink: Mutex::new(Some(sink_id)),
            queue,
            track,
            stats,
        })
    }

    pub fn track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.track
    }

    /// Whether the sender is still registered on its source.
    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> SenderStatsSnapshot {
        SenderStatsSnapshot {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            malformed_frames: self.stats.malformed_frames.load(Ordering::Relaxed),
            write_errors: self.stats.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Unregister from the source and stop the encoder queue. Idempotent.
    pub fn detach(&self) {
        if let Some(id) = self.sink.lock().take() {
            self.source.remove_sink(id);
            self.queue.stop();
            debug!("audio sender detached from {}", self.track.id());
        }
    }
}

impl Drop for AudioTrackSender {
    fn drop(&mut self) {
        self.detach();
    }
}

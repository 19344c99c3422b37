//! Audio frame source: the ingestion point for host PCM.
//!
//! Host threads push frames; registered sinks (the engine's track senders) consume them.
//! One push delivers one whole frame to every sink under the push lock, so concurrent
//! pushes never interleave within a frame. Ordering between frames pushed from different
//! threads is whatever order they take the lock in.
//!
//! Delivery works on a snapshot of the sink list, so a sink may add or remove sinks from
//! `on_data`; the change applies from the next push.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use super::frame::AudioFrame;

/// Consumer of frames pushed into an [`AudioFrameSource`].
///
/// `on_data` runs on the pushing thread with the source's push lock held. Registering or
/// removing sinks from it is fine; pushing into the same source again deadlocks.
pub trait AudioSink: Send + Sync {
    fn on_data(&self, frame: &AudioFrame);
}

/// Identifies a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

struct SourceInner {
    sinks: Mutex<Vec<(SinkId, Arc<dyn AudioSink>)>>,
    push: Mutex<()>,
    next_sink: AtomicU64,
    frames_pushed: AtomicU64,
}

/// Shared handle to one logical audio stream. Clones refer to the same source.
#[derive(Clone)]
pub struct AudioFrameSource {
    inner: Arc<SourceInner>,
}

impl AudioFrameSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                sinks: Mutex::new(Vec::new()),
                push: Mutex::new(()),
                next_sink: AtomicU64::new(0),
                frames_pushed: AtomicU64::new(0),
            }),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn AudioSink>) -> SinkId {
        let id = SinkId(self.inner.next_sink.fetch_add(1, Ordering::Relaxed));
        self.inner.sinks.lock().push((id, sink));
        id
    }

    /// Unregister a sink. Returns false if it was not registered.
    pub fn remove_sink(&self, id: SinkId) -> bool {
        let mut sinks = self.inner.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    pub fn sink_count(&self) -> usize {
        self.inner.sinks.lock().len()
    }

    /// Total frames delivered since creation.
    pub fn frames_pushed(&self) -> u64 {
        self.inner.frames_pushed.load(Ordering::Relaxed)
    }

    /// Push interleaved big-endian 16-bit samples.
    ///
    /// `samples` should hold `2 * frames * channels` bytes. Sizes are not checked here;
    /// a mismatched frame reaches the sinks as declared and is rejected downstream.
    pub fn push_raw_s16be(
        &self,
        samples: &[u8],
        sample_rate: i32,
        channels: usize,
        frames: usize,
    ) {
        let frame = AudioFrame::from_s16be(samples, sample_rate, channels, frames);
        self.deliver(&frame);
    }

    /// Push 10 ms of a 440 Hz tone. Despite the name this is not silence.
    pub fn push_zeroed_data(&self, sample_rate: i32, channels: usize) {
        let frame = tone_frame(sample_rate, channels);
        self.deliver(&frame);
    }

    fn deliver(&self, frame: &AudioFrame) {
        let _push = self.inner.push.lock();
        let sinks: Vec<Arc<dyn AudioSink>> = self
            .inner
            .sinks
            .lock()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        trace!(
            "delivering {} frames @ {} Hz x{} to {} sinks",
            frame.frames,
            frame.sample_rate,
            frame.channels,
            sinks.len()
        );
        for sink in &sinks {
            sink.on_data(frame);
        }
        self.inner.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for AudioFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The frame `push_zeroed_data` delivers.
pub fn tone_frame(sample_rate: i32, channels: usize) -> AudioFrame {
    AudioFrame::tone(sample_rate, channels)
}

/// Create a standalone audio source, independent of any factory.
pub fn create_audio_track_source() -> AudioFrameSource {
    AudioFrameSource::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        frames: Mutex<Vec<AudioFrame>>,
    }

    impl AudioSink for Collect {
        fn on_data(&self, frame: &AudioFrame) {
            self.frames.lock().push(frame.clone());
        }
    }

    #[test]
    fn test_push_reaches_every_sink() {
        let source = create_audio_track_source();
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        source.add_sink(a.clone());
        let id_b = source.add_sink(b.clone());
        assert_eq!(source.sink_count(), 2);

        source.push_raw_s16be(&[0x00, 0x10, 0x00, 0x20], 16000, 2, 1);
        assert!(source.remove_sink(id_b));
        assert!(!source.remove_sink(id_b));
        source.push_zeroed_data(8000, 1);

        assert_eq!(a.frames.lock().len(), 2);
        assert_eq!(b.frames.lock().len(), 1);
        assert_eq!(b.frames.lock()[0].samples, vec![16, 32]);
        assert_eq!(a.frames.lock()[1].frames, 80);
        assert_eq!(source.frames_pushed(), 2);
    }

    #[test]
    fn test_push_without_sinks_is_counted() {
        let source = AudioFrameSource::new();
        source.push_zeroed_data(48000, 2);
        assert_eq!(source.frames_pushed(), 1);
    }

    #[test]
    fn test_clones_share_sinks() {
        let source = AudioFrameSource::new();
        let clone = source.clone();
        let sink = Arc::new(Collect::default());
        clone.add_sink(sink.clone());
        source.push_zeroed_data(16000, 1);
        assert_eq!(sink.frames.lock().len(), 1);
    }

    #[test]
    fn test_zeroed_data_is_deterministic() {
        let source = AudioFrameSource::new();
        let sink = Arc::new(Collect::default());
        source.add_sink(sink.clone());
        source.push_zeroed_data(44100, 2);
        source.push_zeroed_data(44100, 2);
        let frames = sink.frames.lock();
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[0], tone_frame(44100, 2));
    }

    /// Unregisters itself on its first frame.
    struct OneShot {
        source: AudioFrameSource,
        id: Mutex<Option<SinkId>>,
        seen: AtomicU64,
    }

    impl AudioSink for OneShot {
        fn on_data(&self, _frame: &AudioFrame) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = self.id.lock().take() {
                self.source.remove_sink(id);
            }
        }
    }

    #[test]
    fn test_sink_can_remove_itself_during_delivery() {
        let source = AudioFrameSource::new();
        let sink = Arc::new(OneShot {
            source: source.clone(),
            id: Mutex::new(None),
            seen: AtomicU64::new(0),
        });
        let after = Arc::new(Collect::default());
        let id = source.add_sink(sink.clone());
        *sink.id.lock() = Some(id);
        source.add_sink(after.clone());

        source.push_zeroed_data(8000, 1);
        source.push_zeroed_data(8000, 1);

        assert_eq!(sink.seen.load(Ordering::SeqCst), 1);
        assert_eq!(after.frames.lock().len(), 2);
        assert_eq!(source.sink_count(), 1);
    }
}

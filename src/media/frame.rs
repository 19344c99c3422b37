//! PCM audio frames as handed to the engine's media pipeline.

use std::f64::consts::PI;
use std::time::Duration;

/// Bits per sample of every frame this crate produces
pub const BITS_PER_SAMPLE: u32 = 16;

/// Frequency of the synthetic tone
pub const TONE_FREQUENCY_HZ: f64 = 440.0;

/// Peak amplitude of the synthetic tone (2^15, saturated on the positive side)
pub const TONE_AMPLITUDE: f64 = 32768.0;

/// Frames per second of synthetic audio (10 ms frames)
pub const FRAMES_PER_SECOND: i32 = 100;

/// Largest sample buffer a synthetic tone frame is built with
pub const MAX_TONE_SAMPLES: usize = 1 << 24;

/// One block of interleaved 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved samples
    pub samples: Vec<i16>,
    /// Always 16
    pub bits_per_sample: u32,
    /// Sample rate in Hz, as declared by the producer
    pub sample_rate: i32,
    /// Channel count, as declared by the producer
    pub channels: usize,
    /// Samples per channel, as declared by the producer
    pub frames: usize,
}

impl AudioFrame {
    /// Decode big-endian 16-bit samples. A trailing odd byte is ignored; the declared
    /// rate, channel and frame counts are kept as given.
    pub fn from_s16be(data: &[u8], sample_rate: i32, channels: usize, frames: usize) -> Self {
        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Self {
            samples,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_rate,
            channels,
            frames,
        }
    }

    /// 10 ms of a 440 Hz full-scale sine, identical on every channel.
    ///
    /// `sample_rate / 100` frames are produced (integer division). A non-positive rate,
    /// or a shape needing more than [`MAX_TONE_SAMPLES`] samples, gives an empty frame.
    pub fn tone(sample_rate: i32, channels: usize) -> Self {
        let frames = if sample_rate > 0 {
            (sample_rate / FRAMES_PER_SECOND) as usize
        } else {
            0
        };

        let samples = match frames.checked_mul(channels) {
            Some(len) if len <= MAX_TONE_SAMPLES => {
                let mut samples = Vec::with_capacity(len);
                for i in 0..frames {
                    let value = tone_sample(i, sample_rate);
                    samples.extend(std::iter::repeat(value).take(channels));
                }
                samples
            }
            _ => Vec::new(),
        };

        Self {
            samples,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_rate,
            channels,
            frames,
        }
    }

    /// Whether the sample buffer matches the declared shape.
    pub fn is_well_formed(&self) -> bool {
        self.channels > 0
            && self.sample_rate > 0
            && self.frames.checked_mul(self.channels) == Some(self.samples.len())
    }

    /// Playback duration implied by the declared frame count and rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }
}

/// Tone sample for frame index `i`: `round(2^15 * sin(2π·440·i/rate))`, saturated to i16.
pub fn tone_sample(i: usize, sample_rate: i32) -> i16 {
    let t = i as f64 / sample_rate as f64;
    let value = (TONE_AMPLITUDE * (2.0 * PI * TONE_FREQUENCY_HZ * t).sin()).round();
    value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_s16be_decodes_big_endian() {
        let frame = AudioFrame::from_s16be(&[0x01, 0x02, 0xFF, 0xFE, 0x80, 0x00], 8000, 1, 3);
        assert_eq!(frame.samples, vec![0x0102, -2, i16::MIN]);
        assert_eq!(frame.bits_per_sample, 16);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn test_from_s16be_keeps_declared_shape() {
        // odd trailing byte dropped, mismatched frame count forwarded as declared
        let frame = AudioFrame::from_s16be(&[0x00, 0x01, 0x7F], 48000, 2, 480);
        assert_eq!(frame.samples, vec![1]);
        assert_eq!(frame.frames, 480);
        assert_eq!(frame.channels, 2);
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn test_tone_shape_at_48k_stereo() {
        let frame = AudioFrame::tone(48000, 2);
        assert_eq!(frame.frames, 480);
        assert_eq!(frame.samples.len(), 960);
        assert_eq!(frame.duration(), Duration::from_millis(10));
        for (i, pair) in frame.samples.chunks_exact(2).enumerate() {
            let expected = (32768.0 * (2.0 * PI * 440.0 * i as f64 / 48000.0).sin()).round();
            assert_eq!(pair[0] as f64, expected.min(32767.0));
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_tone_truncates_non_divisible_rate() {
        let frame = AudioFrame::tone(44150, 1);
        assert_eq!(frame.frames, 441);
        assert_eq!(frame.samples.len(), 441);
    }

    #[test]
    fn test_tone_non_positive_rate_is_empty() {
        for rate in [0, -8000] {
            let frame = AudioFrame::tone(rate, 2);
            assert_eq!(frame.frames, 0);
            assert!(frame.samples.is_empty());
            assert_eq!(frame.duration(), Duration::ZERO);
        }
    }

    #[test]
    fn test_tone_oversized_channel_count_is_empty() {
        for channels in [usize::MAX / 4, usize::MAX, u32::MAX as usize] {
            let frame = AudioFrame::tone(48000, channels);
            assert_eq!(frame.frames, 480);
            assert_eq!(frame.channels, channels);
            assert!(frame.samples.is_empty());
            assert!(!frame.is_well_formed());
        }
    }

    #[test]
    fn test_overflowing_shape_is_not_well_formed() {
        let frame = AudioFrame::from_s16be(&[0u8; 4], 48000, usize::MAX, 2);
        assert!(!frame.is_well_formed());
        let frame = AudioFrame::from_s16be(&[0u8; 4], 48000, 2, usize::MAX);
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn test_tone_sample_saturates_at_peak() {
        // 440 Hz at 1760 Hz sampling hits the positive peak at i = 1
        assert_eq!(tone_sample(1, 1760), i16::MAX);
        assert_eq!(tone_sample(3, 1760), i16::MIN);
        assert_eq!(tone_sample(0, 1760), 0);
    }
}

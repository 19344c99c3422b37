//! G.711 mu-law (PCMU) encoding for the outgoing audio track.
//!
//! PCMU runs at 8 kHz mono, so every frame is mixed down to one channel and
//! resampled by linear interpolation before companding.

use super::frame::AudioFrame;

/// PCMU clock rate
pub const PCMU_SAMPLE_RATE: u32 = 8000;

/// Encodes one 16-bit sample to a mu-law byte (ITU-T G.711).
#[inline]
pub fn ulaw_encode(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    let sign = if sample < 0 { 0x80 } else { 0x00 };
    // widened before negation so i16::MIN does not overflow
    let magnitude = (sample as i32).abs().min(CLIP) + BIAS;

    let exponent = match magnitude {
        m if m >= 0x4000 => 7,
        m if m >= 0x2000 => 6,
        m if m >= 0x1000 => 5,
        m if m >= 0x0800 => 4,
        m if m >= 0x0400 => 3,
        m if m >= 0x0200 => 2,
        m if m >= 0x0100 => 1,
        _ => 0,
    };
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) | mantissa) as u8
}

/// Average interleaved channels into one.
pub fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
            (sum / channels as i64) as i16
        })
        .collect()
}

/// Linear-interpolation resampler from `from_rate` to `to_rate`.
pub fn resample_linear(mono: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || mono.is_empty() {
        return mono.to_vec();
    }

    let out_len = (mono.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = mono.len() - 1;

    (0..out_len)
        .map(|n| {
            let pos = n as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = pos - idx as f64;
            let a = mono[idx] as f64;
            let b = mono[next] as f64;
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}

/// Stateless PCMU encoder for well-formed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmuEncoder;

impl PcmuEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a frame to 8 kHz mono mu-law. The frame must be well formed.
    pub fn encode(&self, frame: &AudioFrame) -> Vec<u8> {
        let mono = downmix(&frame.samples, frame.channels);
        let narrow = resample_linear(&mono, frame.sample_rate as u32, PCMU_SAMPLE_RATE);
        narrow.into_iter().map(ulaw_encode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ulaw_decode(y: u8) -> i16 {
        let y = !y as i16 & 0xFF;
        let sign = y & 0x80;
        let exponent = (y >> 4) & 0x07;
        let mantissa = y & 0x0F;
        let magnitude = (((mantissa << 3) + 0x84) << exponent) - 0x84;
        if sign != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    #[test]
    fn test_ulaw_known_values() {
        assert_eq!(ulaw_encode(0), 0xFF);
        assert_eq!(ulaw_encode(-1), 0x7F);
        assert_eq!(ulaw_encode(i16::MAX), 0x80);
        assert_eq!(ulaw_encode(i16::MIN), 0x00);
    }

    #[test]
    fn test_ulaw_error_is_bounded() {
        for sample in (-32000i32..32000).step_by(97) {
            let decoded = ulaw_decode(ulaw_encode(sample as i16)) as i32;
            let tolerance = (sample.abs() / 16).max(8);
            assert!(
                (decoded - sample).abs() <= tolerance,
                "sample {} decoded as {}",
                sample,
                decoded
            );
        }
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[100, 300, -50, 50], 2), vec![200, 0]);
        assert_eq!(downmix(&[1, 2, 3], 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_downmix_wide_frame_does_not_overflow() {
        let channels = 70_000;
        assert_eq!(downmix(&vec![i16::MAX; channels], channels), vec![i16::MAX]);
        assert_eq!(downmix(&vec![i16::MIN; channels], channels), vec![i16::MIN]);
    }

    #[test]
    fn test_resample_48k_to_8k() {
        let mono: Vec<i16> = (0..480).map(|i| i as i16).collect();
        let out = resample_linear(&mono, 48000, 8000);
        assert_eq!(out.len(), 80);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 6);
        assert_eq!(out[79], 474);
    }

    #[test]
    fn test_resample_upsamples() {
        let out = resample_linear(&[0, 100], 4000, 8000);
        assert_eq!(out, vec![0, 50, 100, 100]);
    }

    #[test]
    fn test_encode_tone_frame() {
        let frame = AudioFrame::tone(48000, 2);
        let encoded = PcmuEncoder::new().encode(&frame);
        assert_eq!(encoded.len(), 80);
        // first sample of the tone is zero
        assert_eq!(encoded[0], 0xFF);
    }
}

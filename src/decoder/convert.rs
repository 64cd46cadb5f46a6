//! Planar float to interleaved 16-bit PCM conversion

use super::AudioFrame;
use crate::assets::{BYTES_PER_SAMPLE_FRAME, PCM_SCALE};

/// Convert one float sample to signed 16-bit PCM.
///
/// Out-of-range decoder output is clamped to [-1.0, 1.0] before scaling, the
/// scaled value is truncated toward negative infinity.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM_SCALE).floor() as i16
}

/// Interleave `frame` into `out` as native-endian stereo s16.
///
/// Every sample frame takes 4 bytes whatever the source channel count; mono
/// samples are written to both channels. Returns the number of bytes produced,
/// which is capped by the space available in `out`.
pub fn interleave_s16(frame: &AudioFrame, out: &mut [u8]) -> usize {
    let (left, right) = match frame.planes.as_slice() {
        [] => return 0,
        [mono] => (mono, mono),
        [left, right, ..] => (left, right),
    };

    let frames = frame
        .samples
        .min(left.len())
        .min(right.len())
        .min(out.len() / BYTES_PER_SAMPLE_FRAME);

    for (i, chunk) in out
        .chunks_exact_mut(BYTES_PER_SAMPLE_FRAME)
        .take(frames)
        .enumerate()
    {
        chunk[..2].copy_from_slice(&sample_to_i16(left[i]).to_ne_bytes());
        chunk[2..].copy_from_slice(&sample_to_i16(right[i]).to_ne_bytes());
    }

    frames * BYTES_PER_SAMPLE_FRAME
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_stereo_half_scale() {
        let frame = AudioFrame::stereo(vec![0.5], vec![-0.5]);
        let mut out = [0u8; 4];

        assert_eq!(interleave_s16(&frame, &mut out), 4);
        assert_eq!(samples(&out), vec![16383, -16384]);
    }

    #[test]
    fn test_clamping_out_of_range() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32767);
        assert_eq!(sample_to_i16(1.7), 32767);
        assert_eq!(sample_to_i16(250.0), 32767);
        assert_eq!(sample_to_i16(-3.2), -32767);
        assert_eq!(sample_to_i16(f32::INFINITY), 32767);
        assert_eq!(sample_to_i16(f32::NEG_INFINITY), -32767);
    }

    #[test]
    fn test_monotonic_inside_range() {
        let mut previous = i16::MIN;
        for step in 0..=2000 {
            let value = -1.0 + step as f32 / 1000.0;
            let converted = sample_to_i16(value);
            assert!(converted >= previous, "{} produced {}", value, converted);
            previous = converted;
        }
    }

    #[test]
    fn test_mono_fans_out_to_both_channels() {
        let frame = AudioFrame::mono(vec![0.25, -0.25, 0.0]);
        let mut out = [0u8; 12];

        assert_eq!(interleave_s16(&frame, &mut out), 12);
        assert_eq!(
            samples(&out),
            vec![8191, 8191, -8192, -8192, 0, 0]
        );
    }

    #[test]
    fn test_stereo_interleaves_channel_order() {
        let frame = AudioFrame::stereo(vec![0.0, 1.0], vec![-1.0, 0.0]);
        let mut out = [0u8; 8];

        interleave_s16(&frame, &mut out);
        assert_eq!(samples(&out), vec![0, -32767, 32767, 0]);
    }

    #[test]
    fn test_output_capped_by_buffer() {
        let frame = AudioFrame::mono(vec![0.1; 10]);
        let mut out = [0u8; 9];

        assert_eq!(interleave_s16(&frame, &mut out), 8);
    }

    #[test]
    fn test_empty_frame_produces_nothing() {
        let mut out = [0u8; 16];
        assert_eq!(interleave_s16(&AudioFrame::default(), &mut out), 0);
        assert_eq!(interleave_s16(&AudioFrame::mono(Vec::new()), &mut out), 0);
    }
}

// Sample conversions shared by the segmenter and the assembler.
//
// The float/int16 scale is asymmetric on purpose: negative values use
// 0x8000 and non-negative values 0x7FFF, so -1.0 maps to i16::MIN and
// 1.0 to i16::MAX without overflowing at either end.

/// Convert one float sample to signed 16-bit PCM.
///
/// NaN is treated as silence; everything else is clamped to [-1, 1]
/// before scaling and rounded to the nearest integer.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

pub fn samples_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| sample_to_i16(s)).collect()
}

/// Inverse of [`sample_to_i16`], using the same asymmetric scale.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&v| {
            if v < 0 {
                v as f32 / 32768.0
            } else {
                v as f32 / 32767.0
            }
        })
        .collect()
}

/// Decode little-endian float32 bytes. A trailing remainder that does not
/// fill a whole sample is dropped; callers validate alignment upstream.
pub fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| {
            let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if v.is_nan() {
                0.0
            } else {
                v
            }
        })
        .collect()
}

/// Decode little-endian int16 bytes.
pub fn decode_i16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Scale a buffer so its peak reaches `target`, but only upward: a buffer
/// whose peak already meets the target, or an all-silent buffer, is left
/// untouched. Returns true if the buffer was scaled.
pub fn normalize_peak(samples: &mut [f32], target: f32) -> bool {
    let mut peak = 0.0f32;
    for &s in samples.iter() {
        let v = s.abs();
        if v > peak {
            peak = v;
        }
    }
    if peak == 0.0 || peak >= target {
        return false;
    }
    let k = target / peak;
    for s in samples.iter_mut() {
        *s *= k;
    }
    true
}

/// Linear-interpolation resampling. For each output index `i` the source
/// position is `i / ratio` (ratio = out_rate / in_rate); the floor and
/// ceil neighbours are blended by the fractional offset.
pub fn resample_linear(input: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if in_rate == out_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = out_rate as f64 / in_rate as f64;
    let out_len = (input.len() as f64 * ratio).round() as usize;
    let last = input.len() - 1;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let p0 = (src_pos.floor() as usize).min(last);
        let p1 = (p0 + 1).min(last);
        let t = (src_pos - p0 as f64) as f32;
        out.push(input[p0] * (1.0 - t) + input[p1] * t);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_hits_exact_bounds() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        assert_eq!(sample_to_i16(3.5), 32767);
        assert_eq!(sample_to_i16(-2.0), -32768);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn i16_round_trip_is_lossless() {
        let original: Vec<i16> = vec![-32768, -12345, -1, 0, 1, 12345, 32767];
        let floats = i16_to_f32(&original);
        assert_eq!(samples_to_i16(&floats), original);
    }

    #[test]
    fn f32le_decode_drops_trailing_remainder() {
        let mut bytes: Vec<u8> = 0.5f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let decoded = decode_f32le(&bytes);
        assert_eq!(decoded, vec![0.5]);
    }

    #[test]
    fn normalization_scales_up_only() {
        let mut quiet = vec![0.25, -0.5, 0.1];
        assert!(normalize_peak(&mut quiet, 0.99));
        assert!((quiet[1].abs() - 0.99).abs() < 1e-6);

        let mut loud = vec![0.995, -0.2];
        assert!(!normalize_peak(&mut loud, 0.99));
        assert_eq!(loud, vec![0.995, -0.2]);
    }

    #[test]
    fn normalization_leaves_silence_untouched() {
        let mut silence = vec![0.0; 16];
        assert!(!normalize_peak(&mut silence, 0.99));
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn resampling_to_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_linear(&input, 48000, 48000), input);
    }

    #[test]
    fn upsampling_doubles_length() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample_linear(&input, 8000, 16000);
        assert_eq!(out.len(), 8);
        // even output indices land exactly on source samples
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 1.0);
        assert_eq!(out[4], 0.0);
        assert_eq!(out[6], -1.0);
    }

    #[test]
    fn resampling_empty_input_is_empty() {
        assert!(resample_linear(&[], 8000, 16000).is_empty());
    }
}

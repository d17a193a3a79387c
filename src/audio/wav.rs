use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Canonical spec for 16-bit integer PCM output.
pub fn pcm_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode samples into an in-memory WAV container with the standard
/// 44-byte PCM header.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, pcm_spec(sample_rate, channels))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write samples to a WAV file at `path`.
pub fn write_wav_file(
    path: impl AsRef<Path>,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, pcm_spec(sample_rate, channels))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_canonical_pcm_layout() {
        let samples = vec![0i16; 100];
        let bytes = encode_wav(&samples, 16_000, 1).unwrap();
        let data_size = 200u32;

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 36 + data_size);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 1); // PCM
        assert_eq!(u16::from_le_bytes(bytes[22..24].try_into().unwrap()), 1); // mono
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 16_000);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 32_000); // byte rate
        assert_eq!(u16::from_le_bytes(bytes[32..34].try_into().unwrap()), 2); // block align
        assert_eq!(u16::from_le_bytes(bytes[34..36].try_into().unwrap()), 16); // bits
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), data_size);
        assert_eq!(bytes.len(), 44 + data_size as usize);
    }

    #[test]
    fn payload_is_little_endian_samples() {
        let bytes = encode_wav(&[0x1234, -2], 8_000, 1).unwrap();
        assert_eq!(&bytes[44..48], &[0x34, 0x12, 0xFE, 0xFF]);
    }
}

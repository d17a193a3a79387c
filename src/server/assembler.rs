use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::audio::{pcm, wav};
use crate::server::registry::AudioFormat;
use crate::server::store::ChunkStore;
use crate::transport::messages::WireFormat;

/// How sequence gaps (dropped or never-sent chunks) appear in the
/// merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    /// Insert one chunk's worth of silence per missing sequence number,
    /// preserving wall-clock timing. Requires the session to have
    /// declared its uniform chunk length.
    FillSilence,
    /// Concatenate whatever exists, shifting later audio earlier.
    Skip,
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no chunks stored for session {0}")]
    NoChunks(String),
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Resample the merged audio to this rate (linear interpolation)
    pub target_sample_rate: Option<u32>,
    pub gap_policy: GapPolicy,
    /// Last sequence number the client claims to have sent; lets the
    /// gap policy pad chunks missing from the end of the recording
    pub expected_last_seq: Option<u64>,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            target_sample_rate: None,
            gap_policy: GapPolicy::FillSilence,
            expected_last_seq: None,
        }
    }
}

/// The file produced by one merge.
#[derive(Debug, Clone)]
pub struct MergedArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub total_samples: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Merge every stored chunk of a session into one WAV file.
///
/// Chunks are taken in ascending sequence order regardless of how they
/// arrived, decoded to floats, optionally resampled, re-quantized to
/// 16-bit PCM and written with the canonical 44-byte header. Source
/// chunks are left in place; a failed merge never corrupts them.
pub fn assemble(
    store: &ChunkStore,
    session_id: &str,
    format: &AudioFormat,
    opts: &AssembleOptions,
) -> Result<MergedArtifact, AssembleError> {
    if format.sample_rate == 0 {
        return Err(AssembleError::InvalidSampleRate(0));
    }
    if let Some(rate) = opts.target_sample_rate {
        if rate == 0 {
            return Err(AssembleError::InvalidSampleRate(rate));
        }
    }

    let chunks = store.list(session_id);
    if chunks.is_empty() {
        return Err(AssembleError::NoChunks(session_id.to_string()));
    }

    let mut samples: Vec<f32> = Vec::new();
    let mut expected_seq = 0u64;
    for (seq, path) in &chunks {
        if *seq > expected_seq {
            let missing_chunks = *seq - expected_seq;
            match (opts.gap_policy, format.chunk_samples) {
                (GapPolicy::FillSilence, Some(chunk_samples)) => {
                    let missing = missing_chunks as usize * chunk_samples;
                    warn!(
                        session = session_id,
                        from = expected_seq,
                        to = seq,
                        silent_samples = missing,
                        "sequence gap, padding with silence"
                    );
                    samples.resize(samples.len() + missing, 0.0);
                }
                (GapPolicy::FillSilence, None) => {
                    warn!(
                        session = session_id,
                        from = expected_seq,
                        to = seq,
                        "sequence gap with undeclared chunk length, concatenating"
                    );
                }
                (GapPolicy::Skip, _) => {
                    warn!(
                        session = session_id,
                        from = expected_seq,
                        to = seq,
                        "sequence gap, concatenating without padding"
                    );
                }
            }
        }
        let bytes = fs::read(path)?;
        match format.format {
            WireFormat::F32 => samples.extend(pcm::decode_f32le(&bytes)),
            WireFormat::I16 => samples.extend(pcm::i16_to_f32(&pcm::decode_i16le(&bytes))),
        }
        expected_seq = seq + 1;
    }

    if let (Some(last), GapPolicy::FillSilence, Some(chunk_samples)) = (
        opts.expected_last_seq,
        opts.gap_policy,
        format.chunk_samples,
    ) {
        if last + 1 > expected_seq {
            let missing = (last + 1 - expected_seq) as usize * chunk_samples;
            warn!(
                session = session_id,
                from = expected_seq,
                last_seq = last,
                silent_samples = missing,
                "trailing sequence gap, padding with silence"
            );
            samples.resize(samples.len() + missing, 0.0);
        }
    }

    let (samples, out_rate) = match opts.target_sample_rate {
        Some(rate) if rate != format.sample_rate => (
            pcm::resample_linear(&samples, format.sample_rate, rate),
            rate,
        ),
        _ => (samples, format.sample_rate),
    };

    let pcm16 = pcm::samples_to_i16(&samples);

    let out_dir = store.final_dir(session_id);
    fs::create_dir_all(&out_dir)?;
    let file_name = format!("{session_id}.wav");
    let out_path = out_dir.join(&file_name);
    wav::write_wav_file(&out_path, &pcm16, out_rate, format.channels)?;

    info!(
        session = session_id,
        chunks = chunks.len(),
        samples = pcm16.len(),
        sample_rate = out_rate,
        path = %out_path.display(),
        "recording assembled"
    );

    Ok(MergedArtifact {
        path: out_path,
        file_name,
        total_samples: pcm16.len() as u64,
        sample_rate: out_rate,
        channels: format.channels,
    })
}

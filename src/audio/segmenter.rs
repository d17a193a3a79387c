use tracing::debug;

use super::pcm;

/// Segmenter configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Input sample rate in Hz
    pub sample_rate: u32,
    /// Duration of each emitted segment in seconds (default: 2s)
    pub segment_seconds: f64,
    /// Peak-normalize each segment before integer conversion
    pub normalize: bool,
    /// Peak target for normalization (never scales down)
    pub normalize_target: f32,
    /// Zero-pad the final segment up to full length on stop().
    /// When false the final segment keeps its true (shorter) duration.
    pub pad_last_segment: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            segment_seconds: 2.0,
            normalize: true,
            normalize_target: 0.99,
            pad_last_segment: true,
        }
    }
}

/// One fixed-duration slice of the capture stream, already converted to
/// 16-bit PCM and carrying its sender-assigned sequence number.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Sequence number, assigned from 0 including the final segment
    pub seq: u64,
    /// Sample rate the samples were captured at
    pub sample_rate: u32,
    /// True duration; differs from the segment length only for an
    /// unpadded final segment
    pub duration_seconds: f64,
    /// Converted samples
    pub pcm: Vec<i16>,
}

/// Turns an unbounded stream of small sample blocks into fixed-duration
/// segments. Samples that do not yet fill a segment stay in a carry
/// buffer, so every non-final segment has identical length no matter how
/// irregularly frames arrive.
pub struct Segmenter {
    config: SegmenterConfig,
    carry: Vec<f32>,
    next_seq: u64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            carry: Vec::new(),
            next_seq: 0,
        }
    }

    /// Samples per full segment: floor(sample_rate * segment_seconds).
    pub fn segment_frames(&self) -> usize {
        let frames = (self.config.sample_rate as f64 * self.config.segment_seconds).floor() as usize;
        frames.max(1)
    }

    /// Number of samples currently waiting in the carry buffer.
    pub fn pending_samples(&self) -> usize {
        self.carry.len()
    }

    /// Append a block of samples, emitting as many full segments as the
    /// combined carry allows. The leftover becomes the new carry.
    pub fn push_frame(&mut self, samples: &[f32]) -> Vec<Segment> {
        if samples.is_empty() {
            return Vec::new();
        }
        self.carry.extend_from_slice(samples);

        let seg_len = self.segment_frames();
        let seconds = self.config.segment_seconds;
        let mut emitted = Vec::new();
        let mut offset = 0;
        while self.carry.len() - offset >= seg_len {
            let slice = self.carry[offset..offset + seg_len].to_vec();
            offset += seg_len;
            emitted.push(self.emit(slice, seconds));
        }
        if offset > 0 {
            self.carry.drain(..offset);
        }
        emitted
    }

    /// Flush the carry buffer as the final segment. Stopping is an
    /// explicit finalization step: callers must invoke this after the
    /// last push_frame or the tail of the recording is lost.
    pub fn stop(&mut self) -> Option<Segment> {
        if self.carry.is_empty() {
            return None;
        }
        let seg_len = self.segment_frames();
        let seconds = self.config.segment_seconds;
        let mut tail = std::mem::take(&mut self.carry);

        if self.config.pad_last_segment {
            tail.truncate(seg_len);
            tail.resize(seg_len, 0.0);
            Some(self.emit(tail, seconds))
        } else {
            let true_seconds = tail.len() as f64 / self.config.sample_rate as f64;
            Some(self.emit(tail, true_seconds))
        }
    }

    fn emit(&mut self, mut samples: Vec<f32>, duration_seconds: f64) -> Segment {
        if self.config.normalize {
            pcm::normalize_peak(&mut samples, self.config.normalize_target);
        }
        let segment = Segment {
            seq: self.next_seq,
            sample_rate: self.config.sample_rate,
            duration_seconds,
            pcm: pcm::samples_to_i16(&samples),
        };
        debug!(
            seq = segment.seq,
            samples = segment.pcm.len(),
            "segment emitted"
        );
        self.next_seq += 1;
        segment
    }
}

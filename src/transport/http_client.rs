use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;

use crate::audio::segmenter::Segment;
use crate::transport::messages::{FinishResponse, WireFormat};

/// Discrete-upload carrier: one self-describing POST per chunk, so the
/// server can accept uploads in any order and reconstruct the recording
/// purely from the sequence headers.
pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    sample_rate: u32,
    channels: u16,
    chunk_samples: Option<usize>,
}

impl HttpUploader {
    pub fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        chunk_samples: Option<usize>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            session_id: session_id.into(),
            sample_rate,
            channels,
            chunk_samples,
        }
    }

    /// Upload one segment. Errors surface to the caller; skipping a
    /// failed segment leaves a visible gap in the sequence numbers
    /// instead of silently renumbering later chunks.
    pub async fn upload_segment(&self, segment: &Segment) -> Result<()> {
        let payload: Vec<u8> = segment.pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        let url = format!("{}/api/recorder/chunks", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("x-session-id", &self.session_id)
            .header("x-seq", segment.seq.to_string())
            .header("x-sample-rate", self.sample_rate.to_string())
            .header("x-channels", self.channels.to_string())
            .header("x-format", WireFormat::I16.to_string())
            .body(payload);
        if let Some(chunk_samples) = self.chunk_samples {
            request = request.header("x-chunk-samples", chunk_samples.to_string());
        }

        request
            .send()
            .await
            .with_context(|| format!("chunk {} upload failed", segment.seq))?
            .error_for_status()
            .with_context(|| format!("chunk {} rejected by server", segment.seq))?;

        debug!(seq = segment.seq, "chunk uploaded");
        Ok(())
    }

    /// Request assembly of everything uploaded so far.
    pub async fn finish(&self, target_sample_rate: Option<u32>) -> Result<FinishResponse> {
        let url = format!("{}/api/recorder/finish", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "session_id": self.session_id,
                "target_sample_rate": target_sample_rate,
            }))
            .send()
            .await
            .context("finish request failed")?
            .error_for_status()
            .context("finish rejected by server")?;

        response
            .json::<FinishResponse>()
            .await
            .context("unparseable finish response")
    }
}

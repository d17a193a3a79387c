//! Downstream speech collaborators
//!
//! The pipeline treats speech-to-text and text-to-speech as opaque
//! services: hand over a finished WAV (or a synthesis request) and get
//! text (or audio bytes) back. Everything behind the HTTP call is out
//! of scope.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Recognized text returned by the transcription service.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// A text-to-speech request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe a complete WAV recording.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<Transcription>;

    /// Synthesize speech for the given text and voice.
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>>;
}

/// Speech service reached over HTTP: multipart upload for
/// transcription, JSON for synthesis, optional bearer auth.
pub struct HttpSpeechService {
    client: reqwest::Client,
    transcribe_url: String,
    synthesize_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpSpeechService {
    pub fn new(
        transcribe_url: impl Into<String>,
        synthesize_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            transcribe_url: transcribe_url.into(),
            synthesize_url: synthesize_url.into(),
            model: model.into(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl SpeechService for HttpSpeechService {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<Transcription> {
        let bytes = wav.len();
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .context("failed to build multipart payload")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .authorize(self.client.post(&self.transcribe_url))
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?
            .error_for_status()
            .context("transcription service returned an error")?;

        let transcription = response
            .json::<Transcription>()
            .await
            .context("unparseable transcription response")?;

        info!(bytes, chars = transcription.text.len(), "recording transcribed");
        Ok(transcription)
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>> {
        let response = self
            .authorize(self.client.post(&self.synthesize_url))
            .json(&json!({
                "model": self.model,
                "input": request.text,
                "voice": request.voice,
            }))
            .send()
            .await
            .context("synthesis request failed")?
            .error_for_status()
            .context("synthesis service returned an error")?;

        let audio = response
            .bytes()
            .await
            .context("failed to read synthesized audio")?;
        Ok(audio.to_vec())
    }
}

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatch: Option<DispatchConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Fallback capture rate when the device does not report one
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of each emitted segment
    pub segment_seconds: f64,
    /// Zero-pad the final segment to full length
    pub pad_last_segment: bool,
    /// Peak-normalize segments before integer conversion
    pub normalize: bool,
    /// Pad sequence gaps with silence in merged output
    pub fill_gaps_with_silence: bool,
    /// Segments buffered between the segmenter and the uploader
    pub queue_segments: usize,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Unmerged sessions older than this are garbage collected
    pub orphan_max_age_hours: u64,
}

#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    pub transcribe_url: String,
    pub synthesize_url: String,
    pub model: String,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub matching: MatchingConfig,
    pub media: MediaConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// NATS endpoint carrying the queue-matching topics
    pub nats_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Token issuer endpoint (POST {identity, roomName} -> {token, url})
    pub token_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Recorder chunk slice interval in milliseconds
    pub slice_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    /// NATS endpoint of the speech-to-text service
    pub nats_url: String,
    /// Engine selector, e.g. "streaming"
    pub engine: String,
    pub language: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

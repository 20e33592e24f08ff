use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One buffer of recognizer input (16 kHz mono f32)
#[derive(Debug, Clone)]
pub struct SttFrame {
    pub sequence: u32,
    pub samples: Vec<f32>,
    /// Marks the end of the utterance stream
    pub final_frame: bool,
}

/// Audio frame published to the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct SttFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    /// Base64-encoded little-endian i16 PCM
    pub pcm: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// RFC3339 timestamp
    pub timestamp: String,
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from the STT service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttTranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    pub confidence: Option<f32>,
}

/// Transport seam between the streaming engine and the STT service.
///
/// The transcript stream ending while the engine still runs is treated as
/// an unexpected end and triggers a restart.
#[async_trait]
pub trait SttTransport: Send + Sync {
    async fn publish_frame(&self, frame: SttFrame) -> Result<()>;

    async fn transcripts(&self) -> Result<BoxStream<'static, SttTranscriptMessage>>;
}

/// Production transport over the STT service bus
pub struct NatsSttTransport {
    client: async_nats::Client,
    session_id: String,
    sample_rate: u32,
}

impl NatsSttTransport {
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to STT service at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to STT service")?;

        Ok(Self {
            client,
            session_id,
            sample_rate: 16_000,
        })
    }

    fn encode_pcm(samples: &[f32]) -> String {
        let pcm_bytes: Vec<u8> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        base64::engine::general_purpose::STANDARD.encode(pcm_bytes)
    }
}

#[async_trait]
impl SttTransport for NatsSttTransport {
    async fn publish_frame(&self, frame: SttFrame) -> Result<()> {
        let subject = format!("audio.frame.call-{}", self.session_id);

        let message = SttFrameMessage {
            session_id: self.session_id.clone(),
            sequence: frame.sequence,
            pcm: Self::encode_pcm(&frame.samples),
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: frame.final_frame,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject, payload.into())
            .await
            .context("Failed to publish audio frame")?;

        Ok(())
    }

    async fn transcripts(&self) -> Result<BoxStream<'static, SttTranscriptMessage>> {
        // The service publishes to stt.text.partial and stt.text.final;
        // we filter by session_id in the payload.
        let subject = "stt.text.>";

        let subscriber = self
            .client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        info!("Subscribed to {}", subject);

        let session_id = self.session_id.clone();
        let stream = subscriber.filter_map(move |message| {
            let session_id = session_id.clone();
            async move {
                match serde_json::from_slice::<SttTranscriptMessage>(&message.payload) {
                    Ok(transcript) if transcript.session_id == session_id => Some(transcript),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

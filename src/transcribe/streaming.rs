use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::{FeedConfig, FeedHandlers, TranscribeError, TranscriptEvent};
use super::nats::{SttFrame, SttTransport};

/// Continuous recognizer over the STT service bus.
///
/// Audio is published frame by frame; transcripts arrive on a subscribed
/// stream. When that stream ends while the engine is still running the
/// subscription is reopened, approximating continuous recognition.
pub struct StreamingEngine {
    transport: Arc<dyn SttTransport>,
    config: FeedConfig,
    handlers: FeedHandlers,
    running: Arc<AtomicBool>,
    sequence: Arc<AtomicU32>,
    recv_task: Option<JoinHandle<()>>,
}

impl StreamingEngine {
    pub fn new(
        transport: Arc<dyn SttTransport>,
        config: FeedConfig,
        handlers: FeedHandlers,
    ) -> Self {
        Self {
            transport,
            config,
            handlers,
            running: Arc::new(AtomicBool::new(false)),
            sequence: Arc::new(AtomicU32::new(0)),
            recv_task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin recognition. No-op when already running.
    pub async fn start(&mut self) -> Result<(), TranscribeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Speech engine already running");
            return Ok(());
        }

        info!("Speech engine started (language: {})", self.config.language);

        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);
        let handlers = self.handlers.clone();

        self.recv_task = Some(tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match transport.transcripts().await {
                    Ok(mut stream) => {
                        while let Some(message) = stream.next().await {
                            if !running.load(Ordering::SeqCst) {
                                break;
                            }

                            let timestamp = chrono::DateTime::parse_from_rfc3339(
                                &message.timestamp,
                            )
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now());

                            let event = TranscriptEvent {
                                text: message.text,
                                confidence: message.confidence,
                                is_final: !message.partial,
                                timestamp,
                            };

                            if let Some(handler) = &handlers.on_transcript {
                                handler(event);
                            }
                        }

                        if running.load(Ordering::SeqCst) {
                            warn!("Transcript stream ended; restarting recognition");
                        }
                    }
                    Err(e) => {
                        error!("Failed to open transcript stream: {}", e);
                        if let Some(handler) = &handlers.on_error {
                            handler(TranscribeError::Engine(e.to_string()));
                        }
                        if running.load(Ordering::SeqCst) {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }));

        Ok(())
    }

    /// End recognition.
    ///
    /// The running flag is cleared before anything else so the
    /// restart-on-end loop cannot fire after an intentional stop.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.recv_task.take() {
            task.abort();
        }

        // Final-frame marker tells the service this utterance stream ended
        let frame = SttFrame {
            sequence: self.sequence.load(Ordering::SeqCst),
            samples: Vec::new(),
            final_frame: true,
        };
        if let Err(e) = self.transport.publish_frame(frame).await {
            warn!("Failed to publish final frame (ignored): {}", e);
        }

        info!("Speech engine stopped");
    }

    /// Publish one buffer of tapped audio. Ignored when not running;
    /// transport failures are reported to the error handler, not raised.
    pub async fn push_samples(&self, samples: &[f32]) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Ignoring samples: speech engine not running");
            return;
        }

        let frame = SttFrame {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            samples: samples.to_vec(),
            final_frame: false,
        };

        if let Err(e) = self.transport.publish_frame(frame).await {
            error!("Failed to publish audio frame: {}", e);
            if let Some(handler) = &self.handlers.on_error {
                handler(TranscribeError::Engine(e.to_string()));
            }
        }
    }
}

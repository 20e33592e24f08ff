use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use super::nats::SttTransport;
use super::streaming::StreamingEngine;

/// A recognized piece of speech, pushed to the transcript handler
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub confidence: Option<f32>,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum TranscribeError {
    /// `start()` was called before `initialize()` — a caller defect
    #[error("speech engine not initialized")]
    NotInitialized,

    #[error("unknown speech engine: {0}")]
    UnknownEngine(String),

    #[error("speech engine failure: {0}")]
    Engine(String),
}

/// The closed set of speech-to-text engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Continuous recognition over the STT service bus
    Streaming,
}

impl EngineKind {
    pub fn parse(name: &str) -> Result<Self, TranscribeError> {
        match name {
            "streaming" => Ok(EngineKind::Streaming),
            other => Err(TranscribeError::UnknownEngine(other.to_string())),
        }
    }
}

pub type TranscriptHandler = Arc<dyn Fn(TranscriptEvent) + Send + Sync>;
pub type TranscribeErrorHandler = Arc<dyn Fn(TranscribeError) + Send + Sync>;

/// Handlers, supplied at construction
#[derive(Default, Clone)]
pub struct FeedHandlers {
    pub on_transcript: Option<TranscriptHandler>,
    pub on_error: Option<TranscribeErrorHandler>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub language: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            language: "ko-KR".to_string(),
        }
    }
}

/// Uniform lifecycle over the engine variants:
/// `initialize -> start -> stop -> destroy`.
pub struct TranscriptionFeed {
    kind: EngineKind,
    handlers: FeedHandlers,
    engine: Option<StreamingEngine>,
}

impl TranscriptionFeed {
    pub fn new(kind: EngineKind, handlers: FeedHandlers) -> Self {
        Self {
            kind,
            handlers,
            engine: None,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Construct the selected engine. A previously initialized engine is
    /// stopped and replaced.
    pub async fn initialize(
        &mut self,
        transport: Arc<dyn SttTransport>,
        config: FeedConfig,
    ) -> Result<(), TranscribeError> {
        if let Some(mut old) = self.engine.take() {
            old.stop().await;
        }

        match self.kind {
            EngineKind::Streaming => {
                self.engine = Some(StreamingEngine::new(
                    transport,
                    config,
                    self.handlers.clone(),
                ));
            }
        }

        info!("Speech engine initialized: {:?}", self.kind);
        Ok(())
    }

    /// Fails fast when `initialize` has not been called.
    pub async fn start(&mut self) -> Result<(), TranscribeError> {
        match self.engine.as_mut() {
            Some(engine) => engine.start().await,
            None => Err(TranscribeError::NotInitialized),
        }
    }

    pub async fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop().await;
        }
    }

    /// Feed tapped audio (16 kHz mono) to the recognizer
    pub async fn push_samples(&self, samples: &[f32]) {
        if let Some(engine) = &self.engine {
            engine.push_samples(samples).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.engine
            .as_ref()
            .map(|engine| engine.is_running())
            .unwrap_or(false)
    }

    /// Stop and release the engine. The feed can be re-initialized.
    pub async fn destroy(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop().await;
        }
        info!("Speech engine destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_parses_known_names() {
        assert_eq!(EngineKind::parse("streaming").unwrap(), EngineKind::Streaming);
    }

    #[test]
    fn engine_kind_rejects_unknown_names() {
        let err = EngineKind::parse("clova").unwrap_err();
        assert!(matches!(err, TranscribeError::UnknownEngine(_)));
        assert!(err.to_string().contains("clova"));
    }

    #[tokio::test]
    async fn start_before_initialize_fails_fast() {
        let mut feed = TranscriptionFeed::new(EngineKind::Streaming, FeedHandlers::default());
        let err = feed.start().await.unwrap_err();
        assert!(matches!(err, TranscribeError::NotInitialized));
        assert!(!feed.is_running());
    }

    #[tokio::test]
    async fn stop_without_initialize_is_a_noop() {
        let mut feed = TranscriptionFeed::new(EngineKind::Streaming, FeedHandlers::default());
        feed.stop().await;
        feed.destroy().await;
    }
}

//! Live speech-to-text.
//!
//! `TranscriptionFeed` gives the controller one lifecycle over the engine
//! variants; the streaming engine publishes tapped call audio to the STT
//! service and pushes recognized text back through the transcript handler.

pub mod engine;
pub mod nats;
pub mod streaming;

pub use engine::{
    EngineKind, FeedConfig, FeedHandlers, TranscribeError, TranscribeErrorHandler,
    TranscriptEvent, TranscriptHandler, TranscriptionFeed,
};
pub use nats::{NatsSttTransport, SttFrame, SttFrameMessage, SttTranscriptMessage, SttTransport};
pub use streaming::StreamingEngine;

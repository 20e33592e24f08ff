pub mod audio;
pub mod call;
pub mod config;
pub mod http;
pub mod matching;
pub mod media;
pub mod transcribe;

pub use audio::{
    AudioEncoder, AudioFrame, AudioTrack, CaptureConfig, CapturePipeline, RecordingArtifact,
    SampleTap, TapConfig, WavEncoder,
};
pub use call::{CallController, CallError, CallHandlers, CallState, Role, Session};
pub use config::Config;
pub use http::{create_router, AppState};
pub use matching::{MatchChannel, MatchEvent, MatchGate, MatchKind, MatchNotice, Party};
pub use media::{
    ConnectionState, DisconnectReason, HttpTokenIssuer, MediaError, MediaSession, RoomEvent,
    RoomTransport, TokenIssuer,
};
pub use transcribe::{EngineKind, TranscribeError, TranscriptEvent, TranscriptionFeed};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::AudioTrack;

/// Errors from the media layer
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// Device access was refused. Non-fatal: the session stays connected
    /// and the caller may retry once permission is granted.
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("not connected to a room")]
    NotConnected,

    #[error("room connect failed: {0}")]
    ConnectFailed(String),

    #[error("room transport error: {0}")]
    Transport(String),
}

/// Why a room connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectReason {
    ClientInitiated,
    ServerShutdown,
    ParticipantRemoved,
    RoomDeleted,
    Unknown,
}

/// Room-level events pumped from the transport
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Reconnecting,
    Reconnected,
    /// Terminal: the transport gave up on this connection
    Disconnected { reason: DisconnectReason },
    TrackSubscribed { participant: String, track: AudioTrack },
    TrackUnsubscribed { participant: String },
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
}

/// Options forwarded to the transport when constructing a room
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub adaptive_stream: bool,
    pub dynacast: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            adaptive_stream: true,
            dynacast: true,
        }
    }
}

/// Control half of one live room connection
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn room_name(&self) -> &str;

    /// Request device access and publish the local audio track
    async fn publish_microphone(&self) -> Result<AudioTrack, MediaError>;

    async fn unpublish_microphone(&self) -> Result<(), MediaError>;

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), MediaError>;

    async fn disconnect(&self) -> Result<(), MediaError>;
}

/// A settled room connection: the control handle plus its event stream
pub struct RoomConnection {
    pub handle: Arc<dyn RoomHandle>,
    pub events: mpsc::Receiver<RoomEvent>,
}

/// Seam over the real-time media signaling service.
///
/// Deployments implement this against their signaling stack; tests script
/// it. One `connect` call yields one room connection.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn connect(
        &self,
        server_url: &str,
        token: &str,
        options: &RoomOptions,
    ) -> Result<RoomConnection, MediaError>;
}

/// Playback binding for subscribed remote audio.
///
/// When auto-attach is enabled the session binds every subscribed remote
/// track here; the agent side leaves auto-attach off and routes playback
/// through its own delay/filter chain instead.
pub trait PlaybackSink: Send + Sync {
    fn attach(&self, participant: &str, track: &AudioTrack);
    fn detach(&self, participant: &str);
}

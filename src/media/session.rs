use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio::AudioTrack;

use super::room::{
    DisconnectReason, MediaError, PlaybackSink, RoomEvent, RoomHandle, RoomOptions, RoomTransport,
};

/// Room connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

pub type TrackSubscribedHandler = Arc<dyn Fn(&str, &AudioTrack) + Send + Sync>;
pub type ParticipantHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type DisconnectedHandler = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type MediaErrorHandler = Arc<dyn Fn(&MediaError) + Send + Sync>;

/// Event handlers, supplied at construction
#[derive(Default, Clone)]
pub struct MediaHandlers {
    /// Always fires on track subscription, regardless of auto-attach
    pub on_track_subscribed: Option<TrackSubscribedHandler>,
    pub on_track_unsubscribed: Option<ParticipantHandler>,
    pub on_participant_connected: Option<ParticipantHandler>,
    pub on_participant_disconnected: Option<ParticipantHandler>,
    /// Fires on a terminal room-level disconnect (not caller-initiated)
    pub on_disconnected: Option<DisconnectedHandler>,
    pub on_error: Option<MediaErrorHandler>,
}

#[derive(Clone)]
pub struct MediaSessionOptions {
    /// Bind subscribed remote tracks to the playback sink automatically
    pub auto_attach: bool,
    pub playback: Option<Arc<dyn PlaybackSink>>,
    pub room: RoomOptions,
}

impl Default for MediaSessionOptions {
    fn default() -> Self {
        Self {
            auto_attach: true,
            playback: None,
            room: RoomOptions::default(),
        }
    }
}

struct Inner {
    state: ConnectionState,
    handle: Option<Arc<dyn RoomHandle>>,
    local_track: Option<AudioTrack>,
    remote_tracks: HashMap<String, AudioTrack>,
    participants: Vec<String>,
    muted: bool,
    last_error: Option<String>,
    /// Bumped by `disconnect` so a connect that settles afterwards is undone
    generation: u64,
}

/// Owns exactly one real-time room connection and its track lifecycle.
///
/// `Disconnected -> Connecting -> Connected -> {Reconnecting <-> Connected}
/// -> Disconnected`, with `Connecting -> Disconnected` on failure.
pub struct MediaSession {
    transport: Arc<dyn RoomTransport>,
    options: MediaSessionOptions,
    handlers: MediaHandlers,
    inner: Arc<Mutex<Inner>>,
    /// Serializes the connect critical section so concurrent callers share
    /// one underlying connection attempt
    connect_gate: tokio::sync::Mutex<()>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl MediaSession {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        options: MediaSessionOptions,
        handlers: MediaHandlers,
    ) -> Self {
        Self {
            transport,
            options,
            handlers,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                handle: None,
                local_track: None,
                remote_tracks: HashMap::new(),
                participants: Vec::new(),
                muted: false,
                last_error: None,
                generation: 0,
            })),
            connect_gate: tokio::sync::Mutex::new(()),
            event_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    pub fn participants(&self) -> Vec<String> {
        self.inner.lock().unwrap().participants.clone()
    }

    pub fn remote_track(&self, participant: &str) -> Option<AudioTrack> {
        self.inner
            .lock()
            .unwrap()
            .remote_tracks
            .get(participant)
            .cloned()
    }

    /// Snapshot of the remote track set keyed by participant identity
    pub fn remote_tracks(&self) -> Vec<(String, AudioTrack)> {
        self.inner
            .lock()
            .unwrap()
            .remote_tracks
            .iter()
            .map(|(participant, track)| (participant.clone(), track.clone()))
            .collect()
    }

    pub fn local_track(&self) -> Option<AudioTrack> {
        self.inner.lock().unwrap().local_track.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().unwrap().muted
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().unwrap().last_error.clone()
    }

    /// Connect to a room.
    ///
    /// Concurrent callers are serialized; a caller that arrives while the
    /// session is already connecting or connected receives the settled
    /// handle without a second connection attempt.
    pub async fn connect(
        &self,
        server_url: &str,
        token: &str,
    ) -> Result<Arc<dyn RoomHandle>, MediaError> {
        let _gate = self.connect_gate.lock().await;

        let generation = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(handle) = inner.handle.clone() {
                warn!("Already connected; ignoring duplicate connect");
                return Ok(handle);
            }
            inner.state = ConnectionState::Connecting;
            inner.last_error = None;
            inner.generation
        };

        info!("Connecting to media room at {}", server_url);

        match self
            .transport
            .connect(server_url, token, &self.options.room)
            .await
        {
            Ok(connection) => {
                let handle = connection.handle;

                // A disconnect issued while the connect was in flight wins:
                // undo the settled connection immediately.
                let cancelled = {
                    let inner = self.inner.lock().unwrap();
                    inner.generation != generation
                };
                if cancelled {
                    warn!("Connect settled after disconnect; tearing down room");
                    let _ = handle.disconnect().await;
                    let err = MediaError::ConnectFailed("disconnected during connect".into());
                    self.inner.lock().unwrap().last_error = Some(err.to_string());
                    if let Some(h) = &self.handlers.on_error {
                        h(&err);
                    }
                    return Err(err);
                }

                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.state = ConnectionState::Connected;
                    inner.handle = Some(Arc::clone(&handle));
                }
                self.spawn_event_loop(connection.events);

                info!("Media room connected: {}", handle.room_name());
                Ok(handle)
            }
            Err(e) => {
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.state = ConnectionState::Disconnected;
                    inner.last_error = Some(e.to_string());
                }
                error!("Media room connect failed: {}", e);
                if let Some(h) = &self.handlers.on_error {
                    h(&e);
                }
                Err(e)
            }
        }
    }

    fn spawn_event_loop(&self, mut events: mpsc::Receiver<RoomEvent>) {
        let inner = Arc::clone(&self.inner);
        let handlers = self.handlers.clone();
        let options = self.options.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RoomEvent::TrackSubscribed { participant, track } => {
                        info!("Remote track subscribed: {}", participant);
                        inner
                            .lock()
                            .unwrap()
                            .remote_tracks
                            .insert(participant.clone(), track.clone());
                        if options.auto_attach {
                            if let Some(playback) = &options.playback {
                                playback.attach(&participant, &track);
                            }
                        }
                        if let Some(h) = &handlers.on_track_subscribed {
                            h(&participant, &track);
                        }
                    }
                    RoomEvent::TrackUnsubscribed { participant } => {
                        info!("Remote track unsubscribed: {}", participant);
                        inner.lock().unwrap().remote_tracks.remove(&participant);
                        if options.auto_attach {
                            if let Some(playback) = &options.playback {
                                playback.detach(&participant);
                            }
                        }
                        if let Some(h) = &handlers.on_track_unsubscribed {
                            h(&participant);
                        }
                    }
                    RoomEvent::ParticipantConnected { identity } => {
                        info!("Participant connected: {}", identity);
                        {
                            let mut inner = inner.lock().unwrap();
                            if !inner.participants.contains(&identity) {
                                inner.participants.push(identity.clone());
                            }
                        }
                        if let Some(h) = &handlers.on_participant_connected {
                            h(&identity);
                        }
                    }
                    RoomEvent::ParticipantDisconnected { identity } => {
                        info!("Participant disconnected: {}", identity);
                        inner.lock().unwrap().participants.retain(|p| p != &identity);
                        if let Some(h) = &handlers.on_participant_disconnected {
                            h(&identity);
                        }
                    }
                    RoomEvent::Reconnecting => {
                        // Track sets are kept: the transport resumes them
                        warn!("Media room reconnecting");
                        inner.lock().unwrap().state = ConnectionState::Reconnecting;
                    }
                    RoomEvent::Reconnected => {
                        info!("Media room reconnected");
                        inner.lock().unwrap().state = ConnectionState::Connected;
                    }
                    RoomEvent::Disconnected { reason } => {
                        warn!("Media room disconnected: {:?}", reason);
                        cleanup_inner(&inner, &options);
                        if let Some(h) = &handlers.on_disconnected {
                            h(reason);
                        }
                        break;
                    }
                }
            }
        });

        if let Some(old) = self.event_task.lock().unwrap().replace(task) {
            old.abort();
        }
    }

    /// Request device access and publish the local audio track.
    ///
    /// A permission denial is surfaced as `MediaError::PermissionDenied`
    /// and leaves the session connected; the caller may retry.
    pub async fn enable_microphone(&self) -> Result<AudioTrack, MediaError> {
        let handle = self
            .inner
            .lock()
            .unwrap()
            .handle
            .clone()
            .ok_or(MediaError::NotConnected)?;

        info!("Requesting microphone");

        match handle.publish_microphone().await {
            Ok(track) => {
                let mut inner = self.inner.lock().unwrap();
                inner.local_track = Some(track.clone());
                inner.muted = false;
                info!("Microphone published");
                Ok(track)
            }
            Err(e) => {
                if matches!(e, MediaError::PermissionDenied) {
                    warn!("Microphone permission denied; session stays connected");
                } else {
                    error!("Microphone publish failed: {}", e);
                }
                self.inner.lock().unwrap().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Unpublish the local track. Errors are logged and swallowed: a
    /// session can continue receive-only.
    pub async fn disable_microphone(&self) {
        let handle = {
            let inner = self.inner.lock().unwrap();
            match inner.handle.clone() {
                Some(handle) => handle,
                None => return,
            }
        };

        if let Err(e) = handle.unpublish_microphone().await {
            warn!("Microphone unpublish failed (ignored): {}", e);
        }
        self.inner.lock().unwrap().local_track = None;
        info!("Microphone disabled");
    }

    /// Toggle local publish-enabled state. Idempotent; no-op when not
    /// connected.
    pub async fn set_muted(&self, muted: bool) -> Result<(), MediaError> {
        let (handle, current) = {
            let inner = self.inner.lock().unwrap();
            (inner.handle.clone(), inner.muted)
        };
        let Some(handle) = handle else {
            return Ok(());
        };
        if current == muted {
            return Ok(());
        }

        handle.set_microphone_enabled(!muted).await?;
        self.inner.lock().unwrap().muted = muted;
        info!("Microphone muted: {}", muted);
        Ok(())
    }

    /// Leave the room. Always ends `Disconnected`, even when the transport
    /// calls fail. No-op when already disconnected.
    pub async fn disconnect(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ConnectionState::Disconnected && inner.handle.is_none() {
                return;
            }
            inner.generation = inner.generation.wrapping_add(1);
            inner.handle.clone()
        };

        info!("Disconnecting media room");

        if let Some(handle) = &handle {
            // Best-effort: the local track must not stay live
            if let Err(e) = handle.set_microphone_enabled(false).await {
                warn!("Microphone disable failed (ignored): {}", e);
            }
            if let Err(e) = handle.unpublish_microphone().await {
                warn!("Microphone unpublish failed (ignored): {}", e);
            }
        }

        cleanup_inner(&self.inner, &self.options);

        if let Some(handle) = handle {
            if let Err(e) = handle.disconnect().await {
                warn!("Room disconnect failed (ignored): {}", e);
            }
        }

        if let Some(task) = self.event_task.lock().unwrap().take() {
            task.abort();
        }

        info!("Media room disconnected");
    }
}

/// Shared teardown for caller-initiated and room-level disconnects
fn cleanup_inner(inner: &Arc<Mutex<Inner>>, options: &MediaSessionOptions) {
    let mut inner = inner.lock().unwrap();

    if options.auto_attach {
        if let Some(playback) = &options.playback {
            for participant in inner.remote_tracks.keys() {
                playback.detach(participant);
            }
        }
    }

    inner.remote_tracks.clear();
    inner.participants.clear();
    inner.local_track = None;
    inner.handle = None;
    inner.muted = false;
    inner.state = ConnectionState::Disconnected;
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio::{AudioTrack, CapturePipeline, RecordingArtifact, SampleTap, TapConfig};
use crate::matching::{MatchChannel, MatchEvent, MatchNotice, Party};
use crate::media::{
    DisconnectReason, MediaError, MediaHandlers, MediaSession, MediaSessionOptions,
    ParticipantHandler, RoomTransport, TokenIssuer,
};
use crate::transcribe::TranscriptionFeed;

use super::session::{
    CallState, Role, Session, AGENT_IDENTITY_PREFIX, PROFANITY_AUTO_TERMINATION_THRESHOLD,
};

#[derive(Debug, Error)]
pub enum CallError {
    #[error("party id must not be empty")]
    EmptyPartyId,

    #[error("entry point does not match controller role")]
    RoleMismatch,

    #[error("no matched data; wait for a match first")]
    NoMatchData,

    #[error("token request failed: {0}")]
    Token(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("matching channel failure: {0}")]
    Matching(String),
}

pub type MatchedHandler = Arc<dyn Fn(&MatchEvent) + Send + Sync>;
pub type RankHandler = Arc<dyn Fn(u32) + Send + Sync>;
pub type PeerJoinedHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type CallDisconnectedHandler = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type AutoTerminatedHandler = Arc<dyn Fn(u32) + Send + Sync>;
pub type RecordingReadyHandler = Arc<dyn Fn(RecordingArtifact) + Send + Sync>;

/// Handlers, supplied at construction
#[derive(Default, Clone)]
pub struct CallHandlers {
    pub on_matched: Option<MatchedHandler>,
    pub on_rank_update: Option<RankHandler>,
    /// Customer side: fired when the agent joins the room
    pub on_peer_joined: Option<PeerJoinedHandler>,
    /// A terminal room-level disconnect returned the controller to idle
    pub on_disconnected: Option<CallDisconnectedHandler>,
    /// The profanity threshold terminated the call
    pub on_auto_terminated: Option<AutoTerminatedHandler>,
    /// The call recording was finalized during teardown
    pub on_recording_ready: Option<RecordingReadyHandler>,
}

/// Capture and transcription riding on the session lifecycle.
///
/// Both are optional; when attached, they start once media reports
/// connected and are released in reverse order on every exit path.
#[derive(Clone)]
struct Pipelines {
    capture: Arc<Mutex<Option<Arc<CapturePipeline>>>>,
    transcription: Arc<tokio::sync::Mutex<Option<TranscriptionFeed>>>,
    transcription_enabled: Arc<AtomicBool>,
    tap: Arc<Mutex<Option<SampleTap>>>,
    on_recording_ready: Option<RecordingReadyHandler>,
}

impl Pipelines {
    fn new(on_recording_ready: Option<RecordingReadyHandler>) -> Self {
        Self {
            capture: Arc::new(Mutex::new(None)),
            transcription: Arc::new(tokio::sync::Mutex::new(None)),
            transcription_enabled: Arc::new(AtomicBool::new(false)),
            tap: Arc::new(Mutex::new(None)),
            on_recording_ready,
        }
    }

    fn capture_pipeline(&self) -> Option<Arc<CapturePipeline>> {
        self.capture.lock().unwrap().clone()
    }

    /// Start recording and fold already-subscribed tracks into the mix
    async fn begin(&self, media: &MediaSession) {
        if let Some(pipeline) = self.capture_pipeline() {
            pipeline.start_recording().await;
            for (_, track) in media.remote_tracks() {
                pipeline.add_track(&track).await;
            }
        }
    }

    async fn start_transcription(&self) {
        let mut guard = self.transcription.lock().await;
        if let Some(feed) = guard.as_mut() {
            if let Err(e) = feed.start().await {
                warn!("Transcription start failed (non-fatal): {}", e);
            }
        }
    }

    /// Intake for a track subscribed mid-call. Sync (called from the media
    /// event loop); the async work is spawned.
    fn track_added(&self, track: &AudioTrack) {
        if let Some(pipeline) = self.capture_pipeline() {
            let track = track.clone();
            tokio::spawn(async move {
                pipeline.add_track(&track).await;
            });
        }

        // The first remote track feeds the recognizer
        if self.transcription_enabled.load(Ordering::SeqCst) {
            let mut tap_guard = self.tap.lock().unwrap();
            if tap_guard.is_none() {
                let mut tap = SampleTap::new(TapConfig::default());
                let feed = Arc::clone(&self.transcription);
                tap.start(
                    track,
                    Arc::new(move |buffer: Vec<f32>| {
                        let feed = Arc::clone(&feed);
                        tokio::spawn(async move {
                            if let Some(feed) = feed.lock().await.as_ref() {
                                feed.push_samples(&buffer).await;
                            }
                        });
                    }),
                );
                *tap_guard = Some(tap);
            }
        }
    }

    /// Release everything in reverse start order: tap, recognizer, then
    /// the recorder. Safe to call repeatedly.
    async fn shutdown(&self) {
        let tap = self.tap.lock().unwrap().take();
        if let Some(mut tap) = tap {
            tap.stop();
        }

        if let Some(feed) = self.transcription.lock().await.as_mut() {
            feed.stop().await;
        }

        if let Some(pipeline) = self.capture_pipeline() {
            match pipeline.stop_recording().await {
                Ok(Some(artifact)) => {
                    info!(
                        "Call recording finalized: {} bytes ({})",
                        artifact.data.len(),
                        artifact.mime_type
                    );
                    if let Some(handler) = &self.on_recording_ready {
                        handler(artifact);
                    }
                }
                Ok(None) => {}
                Err(e) => error!("Failed to finalize recording: {}", e),
            }
            pipeline.cleanup().await;
        }
    }
}

struct Inner {
    matching_url: String,
    media: MediaSession,
    tokens: Arc<dyn TokenIssuer>,
    session: Arc<Mutex<Session>>,
    handlers: CallHandlers,
    pipelines: Pipelines,
    matching: tokio::sync::Mutex<Option<MatchChannel>>,
    notice_task: Mutex<Option<JoinHandle<()>>>,
}

/// Top-level state machine for one call.
///
/// Owns the matching channel, drives the media session through
/// connect/teardown, and coordinates the capture pipeline and the
/// transcription feed against session state: `idle -> waiting -> matched
/// -> connecting -> connected -> idle`, with `error` reachable from any
/// step of the connect sequence.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Inner>,
}

impl CallController {
    pub fn new(
        role: Role,
        matching_url: impl Into<String>,
        transport: Arc<dyn RoomTransport>,
        tokens: Arc<dyn TokenIssuer>,
        handlers: CallHandlers,
    ) -> Self {
        let session = Arc::new(Mutex::new(Session::new(role)));
        let pipelines = Pipelines::new(handlers.on_recording_ready.clone());

        // Customers watch for the agent entering the room; agents get no
        // peer-join wiring.
        let on_participant_connected: Option<ParticipantHandler> = if role == Role::Customer {
            let user = handlers.on_peer_joined.clone();
            Some(Arc::new(move |identity: &str| {
                if identity.starts_with(AGENT_IDENTITY_PREFIX) {
                    info!("Agent joined the call: {}", identity);
                    if let Some(h) = &user {
                        h(identity);
                    }
                }
            }))
        } else {
            None
        };

        // Room lifecycle events feed straight back into session state and
        // the attached pipelines.
        let media_handlers = MediaHandlers {
            on_track_subscribed: Some({
                let pipelines = pipelines.clone();
                Arc::new(move |_participant: &str, track: &AudioTrack| {
                    pipelines.track_added(track);
                })
            }),
            on_disconnected: Some({
                let session = Arc::clone(&session);
                let pipelines = pipelines.clone();
                let user = handlers.on_disconnected.clone();
                Arc::new(move |reason: DisconnectReason| {
                    {
                        let mut s = session.lock().unwrap();
                        s.state = CallState::Idle;
                        s.ended_at = Some(Utc::now());
                    }
                    info!("Call returned to idle after room disconnect: {:?}", reason);

                    let pipelines = pipelines.clone();
                    tokio::spawn(async move {
                        pipelines.shutdown().await;
                    });

                    if let Some(h) = &user {
                        h(reason);
                    }
                })
            }),
            on_participant_connected,
            ..Default::default()
        };

        let media = MediaSession::new(
            transport,
            MediaSessionOptions {
                // Agents intercept playback through their own delay/filter
                // chain instead of attaching remote audio directly.
                auto_attach: role == Role::Customer,
                ..Default::default()
            },
            media_handlers,
        );

        Self {
            inner: Arc::new(Inner {
                matching_url: matching_url.into(),
                media,
                tokens,
                session,
                handlers,
                pipelines,
                matching: tokio::sync::Mutex::new(None),
                notice_task: Mutex::new(None),
            }),
        }
    }

    /// Record the connected call through this pipeline
    pub fn attach_capture(&self, pipeline: Arc<CapturePipeline>) {
        *self.inner.pipelines.capture.lock().unwrap() = Some(pipeline);
    }

    /// Transcribe the peer's speech through this feed
    pub async fn attach_transcription(&self, feed: TranscriptionFeed) {
        *self.inner.pipelines.transcription.lock().await = Some(feed);
        self.inner
            .pipelines
            .transcription_enabled
            .store(true, Ordering::SeqCst);
    }

    pub fn role(&self) -> Role {
        self.inner.session.lock().unwrap().role
    }

    pub fn state(&self) -> CallState {
        self.inner.session.lock().unwrap().state
    }

    /// Snapshot of the owned session record
    pub fn session(&self) -> Session {
        self.inner.session.lock().unwrap().clone()
    }

    pub fn matched_data(&self) -> Option<MatchEvent> {
        self.inner.session.lock().unwrap().matched.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.session.lock().unwrap().error.clone()
    }

    pub fn media(&self) -> &MediaSession {
        &self.inner.media
    }

    pub fn participants(&self) -> Vec<String> {
        self.inner.media.participants()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.media.is_muted()
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), CallError> {
        self.inner.media.set_muted(muted).await.map_err(Into::into)
    }

    /// Enter the queue as a customer and wait for a match
    pub async fn start_waiting(&self, customer_id: &str) -> Result<(), CallError> {
        if self.role() != Role::Customer {
            return Err(CallError::RoleMismatch);
        }
        self.start_party(Party::Customer(customer_id.to_string()))
            .await
    }

    /// Listen for assignments as an agent
    pub async fn start_listening(&self, agent_id: &str) -> Result<(), CallError> {
        if self.role() != Role::Agent {
            return Err(CallError::RoleMismatch);
        }
        self.start_party(Party::Agent(agent_id.to_string())).await
    }

    async fn start_party(&self, party: Party) -> Result<(), CallError> {
        if party.id().trim().is_empty() {
            return Err(CallError::EmptyPartyId);
        }

        // Drop any previous subscription before opening a new one so a
        // stale channel cannot deliver into this wait.
        self.teardown_matching().await;

        {
            let mut s = self.inner.session.lock().unwrap();
            s.state = CallState::Waiting;
            s.started_at = Some(Utc::now());
            s.ended_at = None;
            s.error = None;
            s.matched = None;
            s.profanity_count = 0;
        }

        let (notice_tx, mut notice_rx) = mpsc::channel(16);
        let channel = MatchChannel::new(&self.inner.matching_url, party.clone(), notice_tx);

        if let Err(e) = channel.connect().await {
            let mut s = self.inner.session.lock().unwrap();
            s.state = CallState::Error;
            s.error = Some(e.to_string());
            return Err(CallError::Matching(e.to_string()));
        }

        *self.inner.matching.lock().await = Some(channel);

        let controller = self.clone();
        let task = tokio::spawn(async move {
            while let Some(notice) = notice_rx.recv().await {
                match notice {
                    MatchNotice::Matched(event) => controller.handle_match(event).await,
                    MatchNotice::RankUpdate(rank) => {
                        info!("Queue rank update: {}", rank);
                        if let Some(h) = &controller.inner.handlers.on_rank_update {
                            h(rank);
                        }
                    }
                }
            }
        });
        if let Some(old) = self.inner.notice_task.lock().unwrap().replace(task) {
            old.abort();
        }

        info!("Waiting for a match on {}", party.topic());
        Ok(())
    }

    /// Match intake.
    ///
    /// State-based rejection is kept on top of the channel's own epoch
    /// dedup: a caller can hold controller state across channel epochs.
    pub async fn handle_match(&self, event: MatchEvent) {
        {
            let mut s = self.inner.session.lock().unwrap();
            if matches!(
                s.state,
                CallState::Matched | CallState::Connecting | CallState::Connected
            ) {
                warn!("Ignoring match while already {:?}", s.state);
                return;
            }
            s.state = CallState::Matched;
            s.matched = Some(event.clone());
        }

        info!("Matched into room {}", event.room_name);
        if let Some(h) = &self.inner.handlers.on_matched {
            h(&event);
        }

        // Agents stop here: the operator confirms before joining media
        if self.role() == Role::Agent {
            return;
        }

        if let Err(e) = self.perform_connection().await {
            error!("Call connect failed: {}", e);
            let mut s = self.inner.session.lock().unwrap();
            s.state = CallState::Error;
            s.error = Some(e.to_string());
        }
    }

    /// Manual join after operator confirmation (agent side)
    pub async fn connect_to_call(&self) -> Result<(), CallError> {
        {
            let s = self.inner.session.lock().unwrap();
            if s.matched.is_none() {
                return Err(CallError::NoMatchData);
            }
            if matches!(s.state, CallState::Connecting | CallState::Connected) {
                warn!("Already connecting or connected");
                return Ok(());
            }
        }

        if let Err(e) = self.perform_connection().await {
            error!("Call connect failed: {}", e);
            {
                let mut s = self.inner.session.lock().unwrap();
                s.state = CallState::Error;
                s.error = Some(e.to_string());
            }
            return Err(e);
        }
        Ok(())
    }

    async fn perform_connection(&self) -> Result<(), CallError> {
        let (matched, session_id) = {
            let s = self.inner.session.lock().unwrap();
            let matched = s.matched.clone().ok_or(CallError::NoMatchData)?;
            (matched, s.session_id.clone())
        };

        // The match payload carries the identity to join with; fall back
        // to the session id when the queue left it out.
        let identity = matched.identity.clone().unwrap_or(session_id);

        let token = self
            .inner
            .tokens
            .issue(&identity, &matched.room_name)
            .await
            .map_err(|e| CallError::Token(e.to_string()))?;

        self.inner.session.lock().unwrap().state = CallState::Connecting;
        info!("Connecting to call room {}", matched.room_name);

        self.inner.media.connect(&token.url, &token.token).await?;

        self.inner.session.lock().unwrap().state = CallState::Connected;
        info!("Call connected");

        // Capture rides on the connected session
        self.inner.pipelines.begin(&self.inner.media).await;

        // Microphone failure is non-fatal; the caller retries manually
        match self.inner.media.enable_microphone().await {
            Ok(track) => {
                if let Some(pipeline) = self.inner.pipelines.capture_pipeline() {
                    pipeline.add_track(&track).await;
                }
            }
            Err(e) => warn!("Microphone enable failed (non-fatal): {}", e),
        }

        self.inner.pipelines.start_transcription().await;

        Ok(())
    }

    /// End the wait/call. The media session is kept alive when
    /// `disconnect_media` is false (screen navigation mid-call).
    pub async fn disconnect(&self, disconnect_media: bool) {
        self.teardown_matching().await;

        if disconnect_media {
            // Reverse start order: pipelines first, then the room
            self.inner.pipelines.shutdown().await;
            self.inner.media.disconnect().await;
        } else {
            info!("Keeping media session alive across disconnect");
        }

        {
            let mut s = self.inner.session.lock().unwrap();
            s.state = CallState::Idle;
            s.ended_at = Some(Utc::now());
        }
        info!("Call session idle");
    }

    async fn teardown_matching(&self) {
        if let Some(channel) = self.inner.matching.lock().await.take() {
            channel.disconnect().await;
        }
        if let Some(task) = self.inner.notice_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Record a profanity incident. The call is terminated automatically
    /// when the threshold is reached.
    pub async fn record_profanity(&self) -> u32 {
        let count = {
            let mut s = self.inner.session.lock().unwrap();
            s.profanity_count += 1;
            s.profanity_count
        };

        if count >= PROFANITY_AUTO_TERMINATION_THRESHOLD {
            warn!("Profanity threshold reached ({}); terminating call", count);
            if let Some(h) = &self.inner.handlers.on_auto_terminated {
                h(count);
            }
            self.disconnect(true).await;
        }

        count
    }
}

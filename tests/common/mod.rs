// Shared test doubles for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use voicedesk::audio::{AudioEncoder, AudioTrack};
use voicedesk::media::{
    CallToken, MediaError, PlaybackSink, RoomConnection, RoomEvent, RoomHandle, RoomOptions,
    RoomTransport, TokenIssuer,
};
use voicedesk::transcribe::{SttFrame, SttTranscriptMessage, SttTransport};

// ============================================================================
// Media room doubles
// ============================================================================

pub struct MockRoomHandle {
    room_name: String,
    /// Scripted results popped per publish call; empty means success
    pub mic_results: Mutex<VecDeque<Result<AudioTrack, MediaError>>>,
    pub mic_publishes: AtomicUsize,
    pub mic_enabled_calls: Mutex<Vec<bool>>,
    pub disconnect_calls: AtomicUsize,
}

impl MockRoomHandle {
    fn new(room_name: &str, mic_results: VecDeque<Result<AudioTrack, MediaError>>) -> Self {
        Self {
            room_name: room_name.to_string(),
            mic_results: Mutex::new(mic_results),
            mic_publishes: AtomicUsize::new(0),
            mic_enabled_calls: Mutex::new(Vec::new()),
            disconnect_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RoomHandle for MockRoomHandle {
    fn room_name(&self) -> &str {
        &self.room_name
    }

    async fn publish_microphone(&self) -> Result<AudioTrack, MediaError> {
        self.mic_publishes.fetch_add(1, Ordering::SeqCst);
        let scripted = self.mic_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(AudioTrack::new("local-mic")),
        }
    }

    async fn unpublish_microphone(&self) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), MediaError> {
        self.mic_enabled_calls.lock().unwrap().push(enabled);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MediaError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scriptable transport: counts attempts, optionally delays or fails, and
/// exposes the event sender of the most recent connection.
pub struct MockRoomTransport {
    pub connect_attempts: AtomicUsize,
    pub connect_delay: Duration,
    pub fail_connect: AtomicBool,
    /// Microphone results handed to the next connection's handle
    pub scripted_mic: Mutex<VecDeque<Result<AudioTrack, MediaError>>>,
    events: Mutex<Option<mpsc::Sender<RoomEvent>>>,
    last_handle: Mutex<Option<Arc<MockRoomHandle>>>,
}

impl MockRoomTransport {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicUsize::new(0),
            connect_delay: Duration::from_millis(0),
            fail_connect: AtomicBool::new(false),
            scripted_mic: Mutex::new(VecDeque::new()),
            events: Mutex::new(None),
            last_handle: Mutex::new(None),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            connect_delay: delay,
            ..Self::new()
        }
    }

    pub fn script_mic(&self, result: Result<AudioTrack, MediaError>) {
        self.scripted_mic.lock().unwrap().push_back(result);
    }

    pub fn handle(&self) -> Arc<MockRoomHandle> {
        self.last_handle.lock().unwrap().clone().expect("no connection yet")
    }

    pub async fn emit(&self, event: RoomEvent) {
        let sender = self.events.lock().unwrap().clone().expect("no connection yet");
        sender.send(event).await.expect("event receiver dropped");
    }
}

#[async_trait]
impl RoomTransport for MockRoomTransport {
    async fn connect(
        &self,
        _server_url: &str,
        _token: &str,
        _options: &RoomOptions,
    ) -> Result<RoomConnection, MediaError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(MediaError::ConnectFailed("scripted failure".into()));
        }

        let scripted = std::mem::take(&mut *self.scripted_mic.lock().unwrap());
        let handle = Arc::new(MockRoomHandle::new("mock-room", scripted));
        let (tx, rx) = mpsc::channel(16);

        *self.events.lock().unwrap() = Some(tx);
        *self.last_handle.lock().unwrap() = Some(Arc::clone(&handle));

        Ok(RoomConnection { handle, events: rx })
    }
}

/// Records attach/detach calls
#[derive(Default)]
pub struct CountingPlayback {
    pub attached: Mutex<Vec<String>>,
    pub detached: Mutex<Vec<String>>,
}

impl PlaybackSink for CountingPlayback {
    fn attach(&self, participant: &str, _track: &AudioTrack) {
        self.attached.lock().unwrap().push(participant.to_string());
    }

    fn detach(&self, participant: &str) {
        self.detached.lock().unwrap().push(participant.to_string());
    }
}

// ============================================================================
// Token issuer double
// ============================================================================

pub struct MockTokenIssuer {
    pub issued: AtomicUsize,
    pub fail: AtomicBool,
    pub last_request: Mutex<Option<(String, String)>>,
}

impl MockTokenIssuer {
    pub fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenIssuer for MockTokenIssuer {
    async fn issue(&self, identity: &str, room_name: &str) -> Result<CallToken> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("token service unavailable");
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() =
            Some((identity.to_string(), room_name.to_string()));
        Ok(CallToken {
            token: "test-jwt".into(),
            url: "wss://media.test".into(),
        })
    }
}

// ============================================================================
// Recording encoder double
// ============================================================================

/// Encoder claiming opus-in-webm support, so format negotiation picks the
/// first preference candidate.
pub struct StubEncoder;

impl AudioEncoder for StubEncoder {
    fn supports(&self, mime: &str) -> bool {
        mime == "audio/webm;codecs=opus"
    }

    fn native_mime(&self) -> &'static str {
        "audio/wav"
    }

    fn encode(
        &self,
        samples: &[i16],
        _sample_rate: u32,
        _channels: u16,
        _mime: &str,
    ) -> Result<Vec<u8>> {
        let mut data = b"STUB".to_vec();
        data.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        Ok(data)
    }
}

// ============================================================================
// STT transport double
// ============================================================================

pub struct MockSttTransport {
    pub published: Mutex<Vec<SttFrame>>,
    pub opens: AtomicUsize,
    /// Each `transcripts()` call pops one batch; the stream yields the
    /// batch and then ends (an "unexpected end" from the engine's view).
    pub scripted: Mutex<VecDeque<Vec<SttTranscriptMessage>>>,
}

impl MockSttTransport {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn script_batch(&self, batch: Vec<SttTranscriptMessage>) {
        self.scripted.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl SttTransport for MockSttTransport {
    async fn publish_frame(&self, frame: SttFrame) -> Result<()> {
        self.published.lock().unwrap().push(frame);
        Ok(())
    }

    async fn transcripts(&self) -> Result<BoxStream<'static, SttTranscriptMessage>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let batch = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(stream::iter(batch).boxed())
    }
}

pub fn transcript_message(text: &str, partial: bool) -> SttTranscriptMessage {
    SttTranscriptMessage {
        session_id: "call-test".into(),
        text: text.into(),
        partial,
        timestamp: "2026-08-04T10:00:00+00:00".into(),
        confidence: Some(0.9),
    }
}

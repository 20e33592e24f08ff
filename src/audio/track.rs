use tokio::sync::broadcast;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the track started
    pub timestamp_ms: u64,
}

/// A live audio track.
///
/// Cloneable handle over a broadcast channel, so the same track can feed the
/// recording mix bus and the transcription tap at the same time. Frames
/// published while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    id: String,
    tx: broadcast::Sender<AudioFrame>,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { id: id.into(), tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn push(&self, frame: AudioFrame) {
        let _ = self.tx.send(frame);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.tx.subscribe()
    }
}

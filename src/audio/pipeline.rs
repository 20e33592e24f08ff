use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::format::{extension_for, negotiate_mime, AudioEncoder};
use super::mixbus::{MixBus, MixBusConfig};
use super::track::{AudioFrame, AudioTrack};

/// Configuration for the capture pipeline
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interval at which mixed audio is sliced into in-memory chunks
    pub slice_interval_ms: u64,
    /// Maximum mix-bus buffering delay before frames are dropped
    pub max_buffer_delay_ms: u64,
    /// Directory recordings are saved into
    pub recordings_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            slice_interval_ms: 1_000,
            max_buffer_delay_ms: 200,
            recordings_path: PathBuf::from("recordings"),
        }
    }
}

/// A finished recording
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    /// Encoded container bytes
    pub data: Vec<u8>,
    /// Negotiated mime type
    pub mime_type: String,
    /// Elapsed time between start and stop
    pub duration_ms: u64,
}

struct SourcePump {
    track_id: String,
    task: JoinHandle<()>,
}

struct ActiveRecording {
    mime_type: String,
    started_at: DateTime<Utc>,
    mix_tx: mpsc::Sender<(u64, AudioFrame)>,
    mix_task: JoinHandle<()>,
    /// Fixed-interval PCM slices accumulated in memory
    chunks: Arc<Mutex<Vec<Vec<i16>>>>,
    bus: Arc<Mutex<MixBus>>,
    sources: Vec<SourcePump>,
    next_source_id: u64,
}

/// Mixes live audio tracks into a single recordable artifact.
///
/// Tracks are added while recording; each retained source is explicitly
/// disconnected on cleanup so no pump outlives the pipeline.
pub struct CapturePipeline {
    config: CaptureConfig,
    encoder: Arc<dyn AudioEncoder>,
    active: Mutex<Option<ActiveRecording>>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig, encoder: Arc<dyn AudioEncoder>) -> Self {
        Self {
            config,
            encoder,
            active: Mutex::new(None),
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start a recording. No-op when already recording.
    pub async fn start_recording(&self) {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("Recording already started");
            return;
        }

        let mime_type = negotiate_mime(self.encoder.as_ref());

        let bus = Arc::new(Mutex::new(MixBus::new(MixBusConfig {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            max_buffer_delay_ms: self.config.max_buffer_delay_ms,
        })));
        let chunks: Arc<Mutex<Vec<Vec<i16>>>> = Arc::new(Mutex::new(Vec::new()));
        let (mix_tx, mut mix_rx) = mpsc::channel::<(u64, AudioFrame)>(256);

        let slice_len = (self.config.sample_rate as u64
            * self.config.channels as u64
            * self.config.slice_interval_ms
            / 1000) as usize;

        let task_bus = Arc::clone(&bus);
        let task_chunks = Arc::clone(&chunks);

        let mix_task = tokio::spawn(async move {
            let mut current: Vec<i16> = Vec::with_capacity(slice_len);

            while let Some((source_id, frame)) = mix_rx.recv().await {
                let mixed = {
                    let mut bus = task_bus.lock().await;
                    bus.push(source_id, frame);
                    let mut out = Vec::new();
                    while let Some(m) = bus.mix_next() {
                        out.push(m);
                    }
                    out
                };

                for frame in mixed {
                    current.extend_from_slice(&frame.samples);
                    while current.len() >= slice_len {
                        let slice: Vec<i16> = current.drain(..slice_len).collect();
                        task_chunks.lock().await.push(slice);
                    }
                }
            }

            // Senders gone: flush whatever the bus still buffers
            let remaining = task_bus.lock().await.flush();
            for frame in remaining {
                current.extend_from_slice(&frame.samples);
            }
            if !current.is_empty() {
                task_chunks.lock().await.push(current);
            }
        });

        info!(
            "Recording started (mime: {}, slice: {}ms)",
            mime_type, self.config.slice_interval_ms
        );

        *active = Some(ActiveRecording {
            mime_type,
            started_at: Utc::now(),
            mix_tx,
            mix_task,
            chunks,
            bus,
            sources: Vec::new(),
            next_source_id: 0,
        });
    }

    /// Connect a live track into the recording mix.
    ///
    /// Requires `start_recording` to have been called; otherwise the track
    /// is ignored with a warning. A suspended mix bus is resumed first.
    pub async fn add_track(&self, track: &AudioTrack) {
        let mut guard = self.active.lock().await;
        let Some(active) = guard.as_mut() else {
            warn!("Recording not active; ignoring track {}", track.id());
            return;
        };

        // One mix source per track: a second add of the same track would
        // double its volume.
        if active.sources.iter().any(|s| s.track_id == track.id()) {
            debug!("Track {} already in the mix", track.id());
            return;
        }

        let source_id = active.next_source_id;
        active.next_source_id += 1;

        active.bus.lock().await.connect_source(source_id);

        let mut rx = track.subscribe();
        let mix_tx = active.mix_tx.clone();
        let track_id = track.id().to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        if mix_tx.send((source_id, frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Recording pump lagging, {} frames skipped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        active.sources.push(SourcePump {
            track_id: track_id.clone(),
            task,
        });

        info!("Track {} added to recording mix", track_id);
    }

    /// Finish the recording and assemble the artifact.
    ///
    /// Returns `Ok(None)` when no recording was active. Zero accumulated
    /// audio yields a well-formed empty artifact.
    pub async fn stop_recording(&self) -> Result<Option<RecordingArtifact>> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(None);
        };

        let ActiveRecording {
            mime_type,
            started_at,
            mix_tx,
            mix_task,
            chunks,
            bus,
            sources,
            ..
        } = active;

        for source in &sources {
            source.task.abort();
        }
        drop(mix_tx);

        if let Err(e) = mix_task.await {
            if !e.is_cancelled() {
                error!("Mix task panicked: {}", e);
            }
        }

        bus.lock().await.close();

        let samples: Vec<i16> = chunks.lock().await.drain(..).flatten().collect();
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        let data = self
            .encoder
            .encode(
                &samples,
                self.config.sample_rate,
                self.config.channels,
                &mime_type,
            )
            .context("Failed to encode recording")?;

        info!(
            "Recording stopped: {} samples, {} bytes, {}ms",
            samples.len(),
            data.len(),
            duration_ms
        );

        Ok(Some(RecordingArtifact {
            data,
            mime_type,
            duration_ms,
        }))
    }

    /// Write an artifact as `{base_name}.{ext}` into the recordings
    /// directory, extension chosen from the negotiated mime type.
    pub fn save_recording(
        &self,
        artifact: &RecordingArtifact,
        base_name: &str,
    ) -> Result<Option<PathBuf>> {
        if artifact.data.is_empty() {
            warn!("No audio to save");
            return Ok(None);
        }

        fs::create_dir_all(&self.config.recordings_path)
            .context("Failed to create recordings directory")?;

        let filename = format!("{}.{}", base_name, extension_for(&artifact.mime_type));
        let path = self.config.recordings_path.join(filename);

        fs::write(&path, &artifact.data)
            .with_context(|| format!("Failed to write recording: {:?}", path))?;

        info!("Recording saved: {}", path.display());
        Ok(Some(path))
    }

    /// Hard reset from any state: stops an active recorder, disconnects
    /// every registered source, closes the bus, clears buffers. Idempotent.
    pub async fn cleanup(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };

        let ActiveRecording {
            mix_tx,
            mix_task,
            chunks,
            bus,
            sources,
            ..
        } = active;

        for source in sources {
            source.task.abort();
        }
        drop(mix_tx);
        mix_task.abort();

        bus.lock().await.close();
        chunks.lock().await.clear();

        info!("Capture pipeline cleaned up");
    }
}

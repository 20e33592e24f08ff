// Mix bus combining the call's live audio tracks into one recordable stream.
//
// Sources (the customer's and the agent's tracks, possibly more) are
// registered dynamically. Frames are buffered per source, aligned by
// timestamp, and mixed by simple addition with clipping. Frames older than
// the configured delay are dropped to keep buffering bounded.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use super::track::AudioFrame;

/// Configuration for the mix bus
#[derive(Debug, Clone)]
pub struct MixBusConfig {
    /// Sample rate expected from every source
    pub sample_rate: u32,
    /// Channel count expected from every source
    pub channels: u16,
    /// Maximum buffering delay in milliseconds; older frames are dropped
    pub max_buffer_delay_ms: u64,
}

impl Default for MixBusConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            max_buffer_delay_ms: 200,
        }
    }
}

/// Bus lifecycle. A bus starts suspended and is resumed when the first
/// source connects; `close` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Suspended,
    Running,
    Closed,
}

pub struct MixBus {
    config: MixBusConfig,
    /// Buffers keyed by registered source id
    buffers: HashMap<u64, VecDeque<AudioFrame>>,
    state: BusState,
    current_position_ms: u64,
}

impl MixBus {
    pub fn new(config: MixBusConfig) -> Self {
        info!(
            "Mix bus initialized: {}Hz, {} channels",
            config.sample_rate, config.channels
        );

        Self {
            config,
            buffers: HashMap::new(),
            state: BusState::Suspended,
            current_position_ms: 0,
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn source_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn resume(&mut self) {
        if self.state == BusState::Suspended {
            self.state = BusState::Running;
            info!("Mix bus resumed");
        }
    }

    /// Register a source. Resumes the bus first when it is suspended.
    pub fn connect_source(&mut self, source_id: u64) {
        if self.state == BusState::Closed {
            warn!("Ignoring source {} on a closed mix bus", source_id);
            return;
        }
        if self.state == BusState::Suspended {
            self.resume();
        }
        self.buffers.entry(source_id).or_default();
        debug!("Source {} connected to mix bus", source_id);
    }

    pub fn disconnect_source(&mut self, source_id: u64) {
        if self.buffers.remove(&source_id).is_some() {
            debug!("Source {} disconnected from mix bus", source_id);
        }
    }

    /// Buffer a frame from a registered source
    pub fn push(&mut self, source_id: u64, frame: AudioFrame) {
        if self.state != BusState::Running {
            debug!("Dropping frame: mix bus not running");
            return;
        }

        if !self.buffers.contains_key(&source_id) {
            debug!("Dropping frame from unregistered source {}", source_id);
            return;
        }

        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.config.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.config.channels {
            warn!(
                "Frame channel count mismatch: expected {}, got {}. Dropping frame.",
                self.config.channels, frame.channels
            );
            return;
        }

        if let Some(buffer) = self.buffers.get_mut(&source_id) {
            buffer.push_back(frame);
        }

        self.cleanup_old_frames();
    }

    /// Remove frames that are too old (beyond max buffer delay)
    fn cleanup_old_frames(&mut self) {
        let cutoff_time = self
            .current_position_ms
            .saturating_sub(self.config.max_buffer_delay_ms);

        for (source_id, buffer) in &mut self.buffers {
            while let Some(frame) = buffer.front() {
                if frame.timestamp_ms < cutoff_time {
                    warn!(
                        "Dropping old frame from source {} at {}ms (current position: {}ms)",
                        source_id, frame.timestamp_ms, self.current_position_ms
                    );
                    buffer.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Mix the next chunk from all source buffers.
    ///
    /// Returns None when no buffered data is available.
    pub fn mix_next(&mut self) -> Option<AudioFrame> {
        let mut frames_to_mix: Vec<AudioFrame> = Vec::new();

        for buffer in self.buffers.values_mut() {
            if let Some(frame) = buffer.pop_front() {
                frames_to_mix.push(frame);
            }
        }

        if frames_to_mix.is_empty() {
            return None;
        }

        if frames_to_mix.len() == 1 {
            let frame = frames_to_mix.into_iter().next().unwrap();
            self.current_position_ms = frame.timestamp_ms;
            return Some(frame);
        }

        let mixed = self.mix_frames(&frames_to_mix);
        self.current_position_ms = mixed.timestamp_ms;
        Some(mixed)
    }

    /// Drain everything still buffered into mixed frames
    pub fn flush(&mut self) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        while let Some(frame) = self.mix_next() {
            out.push(frame);
        }
        out
    }

    /// Terminal shutdown: drops every buffer. Idempotent.
    pub fn close(&mut self) {
        if self.state == BusState::Closed {
            return;
        }
        self.buffers.clear();
        self.state = BusState::Closed;
        info!("Mix bus closed");
    }

    /// Mix frames by adding their samples together with clipping.
    /// Uses the earliest timestamp and the longest frame length.
    fn mix_frames(&self, frames: &[AudioFrame]) -> AudioFrame {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);
        let mut mixed_samples = Vec::with_capacity(max_len);

        for i in 0..max_len {
            let mut sum: i32 = 0;
            for frame in frames {
                sum += frame.samples.get(i).copied().unwrap_or(0) as i32;
            }
            mixed_samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }

        AudioFrame {
            samples: mixed_samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
        }
    }
}

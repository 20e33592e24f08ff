//! Raw-sample extraction path for transcription.
//!
//! Independent of the mix/record path: a tap consumes a single live track,
//! applies fixed-size buffering and resampling to the recognizer's target
//! rate, and pushes buffers to a caller-supplied sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::track::AudioTrack;

/// Sink receiving fixed-size buffers of mono samples at the target rate
pub type SampleSink = Arc<dyn Fn(Vec<f32>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TapConfig {
    /// Buffer size in milliseconds pushed per sink call
    pub buffer_ms: u64,
    /// Target sample rate in Hz
    pub target_rate: u32,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 200,
            target_rate: 16_000,
        }
    }
}

/// Mix interleaved multi-channel i16 PCM down to mono f32 in [-1, 1]
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().map(|&s| s as f32 / 32_768.0).collect(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| {
                    frame.iter().map(|&s| s as f32 / 32_768.0).sum::<f32>() / n as f32
                })
                .collect()
        }
    }
}

/// Resample by linear interpolation
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Taps one live track and feeds buffered, resampled samples to a sink
pub struct SampleTap {
    config: TapConfig,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SampleTap {
    pub fn new(config: TapConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start pulling from the track. No-op when already running.
    pub fn start(&mut self, track: &AudioTrack, sink: SampleSink) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sample tap already running");
            return;
        }

        info!("Sample tap started on track {}", track.id());

        let mut rx = track.subscribe();
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        let buffer_len =
            (config.target_rate as u64 * config.buffer_ms / 1000) as usize;

        self.task = Some(tokio::spawn(async move {
            let mut pending: Vec<f32> = Vec::with_capacity(buffer_len * 2);

            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                match rx.recv().await {
                    Ok(frame) => {
                        let mono = downmix_to_mono(&frame.samples, frame.channels);
                        let resampled =
                            resample_linear(&mono, frame.sample_rate, config.target_rate);
                        pending.extend_from_slice(&resampled);

                        while pending.len() >= buffer_len {
                            let buffer: Vec<f32> = pending.drain(..buffer_len).collect();
                            sink(buffer);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Sample tap lagging, {} frames skipped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // Push the partial tail so no speech is lost at teardown
            if !pending.is_empty() {
                sink(pending);
            }
        }));
    }

    /// Stop the tap. Safe to call when not running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SampleTap {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use tokio::sync::mpsc;

    #[test]
    fn downmix_mono_scales_to_unit_range() {
        let out = downmix_to_mono(&[i16::MAX, i16::MIN], 1);
        assert!((out[0] - 0.99997).abs() < 1e-3);
        assert!((out[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn downmix_stereo_averages_channels() {
        // L=0.5, R=-0.5 -> 0.0 ; L=0.25, R=0.25 -> 0.25
        let samples = vec![16_384, -16_384, 8_192, 8_192];
        let out = downmix_to_mono(&samples, 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_48k_to_16k_thirds_length() {
        let input = vec![0.5; 480];
        let out = resample_linear(&input, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_preserves_dc_amplitude() {
        let input = vec![0.5; 480];
        for &s in &resample_linear(&input, 48_000, 16_000) {
            assert!((s - 0.5).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn tap_emits_fixed_size_buffers() {
        let track = AudioTrack::new("remote");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut tap = SampleTap::new(TapConfig {
            buffer_ms: 200,
            target_rate: 16_000,
        });
        tap.start(
            &track,
            Arc::new(move |buf: Vec<f32>| {
                let _ = tx.send(buf);
            }),
        );

        // 48 kHz mono: 9600 samples -> 3200 at 16 kHz = one full 200 ms buffer
        track.push(AudioFrame {
            samples: vec![100; 9_600],
            sample_rate: 48_000,
            channels: 1,
            timestamp_ms: 0,
        });

        let buffer = rx.recv().await.unwrap();
        assert_eq!(buffer.len(), 3_200);

        tap.stop();
        assert!(!tap.is_running());
    }

    #[tokio::test]
    async fn tap_start_twice_is_noop() {
        let track = AudioTrack::new("remote");
        let (tx, _rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let sink: SampleSink = {
            let tx = tx.clone();
            Arc::new(move |buf| {
                let _ = tx.send(buf);
            })
        };

        let mut tap = SampleTap::new(TapConfig::default());
        tap.start(&track, Arc::clone(&sink));
        tap.start(&track, sink);
        assert!(tap.is_running());
        tap.stop();
    }
}

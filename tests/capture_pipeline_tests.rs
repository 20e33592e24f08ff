mod common;

use std::sync::Arc;
use std::time::Duration;

use common::StubEncoder;
use voicedesk::audio::{
    AudioFrame, AudioTrack, CaptureConfig, CapturePipeline, RecordingArtifact, WavEncoder,
    ENCODING_CANDIDATES,
};

fn test_config() -> CaptureConfig {
    CaptureConfig {
        sample_rate: 16_000,
        channels: 1,
        slice_interval_ms: 100,
        max_buffer_delay_ms: 200,
        recordings_path: std::env::temp_dir(),
    }
}

fn frame(samples: Vec<i16>, timestamp_ms: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 16_000,
        channels: 1,
        timestamp_ms,
    }
}

// Scenario E: three tracks mix into one artifact whose mime type comes
// from the candidate list.
#[tokio::test]
async fn three_tracks_mix_into_one_tagged_artifact() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));
    pipeline.start_recording().await;

    let tracks = [
        AudioTrack::new("customer"),
        AudioTrack::new("agent"),
        AudioTrack::new("supervisor"),
    ];
    for track in &tracks {
        pipeline.add_track(track).await;
    }

    for (i, track) in tracks.iter().enumerate() {
        track.push(frame(vec![100 * (i as i16 + 1); 1_600], 0));
        track.push(frame(vec![50; 1_600], 100));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    let artifact = pipeline.stop_recording().await.unwrap().unwrap();
    assert!(artifact.data.len() > 0);
    assert!(ENCODING_CANDIDATES.contains(&artifact.mime_type.as_str()));
}

#[tokio::test]
async fn stop_without_start_resolves_none() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));
    let result = pipeline.stop_recording().await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn stop_with_zero_data_resolves_wellformed() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(WavEncoder));
    pipeline.start_recording().await;

    let artifact = pipeline.stop_recording().await.unwrap().unwrap();
    // Valid empty container, not an exception
    assert_eq!(artifact.mime_type, "audio/wav");
    assert_eq!(&artifact.data[0..4], b"RIFF");
    assert!(artifact.duration_ms < 5_000);
}

#[tokio::test]
async fn start_twice_is_a_noop() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));
    pipeline.start_recording().await;
    pipeline.start_recording().await;

    assert!(pipeline.is_recording().await);
    let artifact = pipeline.stop_recording().await.unwrap();
    assert!(artifact.is_some());
    // The single recording is gone after one stop
    assert!(pipeline.stop_recording().await.unwrap().is_none());
}

#[tokio::test]
async fn add_track_before_start_is_ignored() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));
    let track = AudioTrack::new("early");

    pipeline.add_track(&track).await;
    assert!(!pipeline.is_recording().await);
}

#[tokio::test]
async fn cleanup_is_idempotent_from_any_state() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));

    // Idle
    pipeline.cleanup().await;

    // Mid-recording with live sources
    pipeline.start_recording().await;
    let track = AudioTrack::new("customer");
    pipeline.add_track(&track).await;
    track.push(frame(vec![1; 1_600], 0));
    pipeline.cleanup().await;
    assert!(!pipeline.is_recording().await);

    // Already cleaned
    pipeline.cleanup().await;

    // A fresh recording still works afterwards
    pipeline.start_recording().await;
    assert!(pipeline.is_recording().await);
    pipeline.cleanup().await;
}

#[tokio::test]
async fn mixed_audio_reaches_the_artifact() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(WavEncoder));
    pipeline.start_recording().await;

    let track = AudioTrack::new("customer");
    pipeline.add_track(&track).await;

    // 3200 samples = 200ms at 16kHz, i.e. two full 100ms slices
    track.push(frame(vec![1_000; 3_200], 0));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let artifact = pipeline.stop_recording().await.unwrap().unwrap();
    // 44-byte WAV header + at least the sliced samples
    assert!(artifact.data.len() >= 44 + 3_200 * 2);
}

#[tokio::test]
async fn save_recording_names_file_by_negotiated_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig {
        recordings_path: dir.path().to_path_buf(),
        ..test_config()
    };
    let pipeline = CapturePipeline::new(config, Arc::new(StubEncoder));

    let artifact = RecordingArtifact {
        data: b"payload".to_vec(),
        mime_type: "audio/ogg;codecs=opus".into(),
        duration_ms: 1_000,
    };

    let path = pipeline
        .save_recording(&artifact, "consult-42")
        .unwrap()
        .unwrap();
    assert!(path.ends_with("consult-42.ogg"));
    assert_eq!(std::fs::read(&path).unwrap(), b"payload");
}

#[tokio::test]
async fn save_recording_skips_empty_artifacts() {
    let pipeline = CapturePipeline::new(test_config(), Arc::new(StubEncoder));
    let artifact = RecordingArtifact {
        data: Vec::new(),
        mime_type: "audio/webm".into(),
        duration_ms: 0,
    };

    assert!(pipeline.save_recording(&artifact, "empty").unwrap().is_none());
}

pub mod feed;
pub mod format;
pub mod mixbus;
pub mod pipeline;
pub mod track;

pub use feed::{downmix_to_mono, resample_linear, SampleSink, SampleTap, TapConfig};
pub use format::{extension_for, negotiate_mime, AudioEncoder, WavEncoder, ENCODING_CANDIDATES};
pub use mixbus::{BusState, MixBus, MixBusConfig};
pub use pipeline::{CaptureConfig, CapturePipeline, RecordingArtifact};
pub use track::{AudioFrame, AudioTrack};

use std::io::Cursor;

use anyhow::{Context, Result};

/// Candidate encodings probed in preference order when a recording starts.
/// When the encoder supports none of these, its native format is used.
pub const ENCODING_CANDIDATES: [&str; 5] = [
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/ogg",
    "audio/mp4",
];

/// File extension for a negotiated mime type
pub fn extension_for(mime: &str) -> &'static str {
    if mime.contains("ogg") {
        "ogg"
    } else if mime.contains("mp4") {
        "mp4"
    } else if mime.contains("wav") {
        "wav"
    } else {
        "webm"
    }
}

/// Pick the first supported candidate, falling back to the encoder's
/// native format.
pub fn negotiate_mime(encoder: &dyn AudioEncoder) -> String {
    ENCODING_CANDIDATES
        .iter()
        .find(|candidate| encoder.supports(candidate))
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| encoder.native_mime().to_string())
}

/// Encoder seam behind the capture pipeline.
///
/// Implementations turn accumulated PCM into one finished container. The
/// bundled implementation is [`WavEncoder`]; deployments with an opus/webm
/// toolchain plug in their own.
pub trait AudioEncoder: Send + Sync {
    /// Whether this encoder can produce the given mime type
    fn supports(&self, mime: &str) -> bool;

    /// Mime type produced when no preference candidate is supported
    fn native_mime(&self) -> &'static str;

    /// Encode interleaved i16 PCM into a finished container
    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        mime: &str,
    ) -> Result<Vec<u8>>;
}

/// WAV encoder writing into memory
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn supports(&self, mime: &str) -> bool {
        mime == "audio/wav"
    }

    fn native_mime(&self) -> &'static str {
        "audio/wav"
    }

    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        _mime: &str,
    ) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }

        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_mime() {
        assert_eq!(extension_for("audio/webm;codecs=opus"), "webm");
        assert_eq!(extension_for("audio/webm"), "webm");
        assert_eq!(extension_for("audio/ogg;codecs=opus"), "ogg");
        assert_eq!(extension_for("audio/mp4"), "mp4");
        assert_eq!(extension_for("audio/wav"), "wav");
    }

    #[test]
    fn wav_encoder_falls_back_to_native_format() {
        let mime = negotiate_mime(&WavEncoder);
        assert_eq!(mime, "audio/wav");
    }

    #[test]
    fn negotiation_prefers_earliest_supported_candidate() {
        struct OggOnly;
        impl AudioEncoder for OggOnly {
            fn supports(&self, mime: &str) -> bool {
                mime.contains("ogg")
            }
            fn native_mime(&self) -> &'static str {
                "audio/ogg"
            }
            fn encode(&self, _: &[i16], _: u32, _: u16, _: &str) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
        }

        assert_eq!(negotiate_mime(&OggOnly), "audio/ogg;codecs=opus");
    }

    #[test]
    fn wav_encoding_produces_riff_container() {
        let data = WavEncoder
            .encode(&[0, 1, -1, 100], 16_000, 1, "audio/wav")
            .unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        // 44-byte header + 4 samples * 2 bytes
        assert_eq!(data.len(), 44 + 8);
    }

    #[test]
    fn empty_input_yields_wellformed_header_only_container() {
        let data = WavEncoder.encode(&[], 16_000, 1, "audio/wav").unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(data.len(), 44);
    }
}

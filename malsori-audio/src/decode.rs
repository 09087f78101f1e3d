//! Decoding in-memory audio buffers
//!
//! WAV is read natively with hound; everything else is probed with Symphonia.
//! Headerless 16-bit PCM is accepted when the caller says so.

use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use crate::error::{AudioError, Result};

/// Container/codec family inferred from a caller-supplied hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    /// Headerless signed 16-bit little-endian mono
    RawPcm,
    /// Anything else; the extension is passed to Symphonia's probe
    Probe(String),
}

impl AudioFormat {
    /// Interpret an extension (`"wav"`, `".MP3"`) or MIME type (`"audio/wav"`).
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.trim().trim_start_matches('.').to_ascii_lowercase();
        let ext = hint.rsplit('/').next().unwrap_or(&hint).to_string();

        match ext.as_str() {
            "wav" | "wave" | "x-wav" | "vnd.wave" => Self::Wav,
            "pcm" | "raw" | "s16le" => Self::RawPcm,
            "mpeg" => Self::Probe("mp3".to_string()),
            _ => Self::Probe(ext),
        }
    }
}

/// Decoded, still interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Decode `bytes` according to `format`
///
/// `raw_sample_rate` is only used for [`AudioFormat::RawPcm`].
pub fn decode_bytes(bytes: &[u8], format: &AudioFormat, raw_sample_rate: u32) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    let decoded = match format {
        AudioFormat::Wav => decode_wav(bytes)?,
        AudioFormat::RawPcm => decode_raw_pcm(bytes, raw_sample_rate)?,
        AudioFormat::Probe(ext) => decode_with_symphonia(bytes, ext)?,
    };

    if decoded.samples.is_empty() {
        return Err(AudioError::Empty);
    }

    info!(
        "Decoded audio: {} Hz, {} channels, {:.2}s",
        decoded.sample_rate,
        decoded.channels,
        decoded.duration_secs()
    );
    Ok(decoded)
}

/// Decode a RIFF/WAVE buffer
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| AudioError::decode(format!("Failed to open WAV: {}", e)))?;

    let spec = reader.spec();
    debug!(
        "WAV header: {} Hz, {} channels, {} bits, {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AudioError::decode(format!("Failed to read samples: {}", e)))?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AudioError::decode(format!("Failed to read samples: {}", e)))?
        }
        (format, bits) => {
            return Err(AudioError::unsupported(format!(
                "WAV {:?} with {} bits per sample",
                format, bits
            )))
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_raw_pcm(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio> {
    if sample_rate == 0 {
        return Err(AudioError::invalid_config("Raw PCM needs a sample rate"));
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::decode(format!(
            "Raw 16-bit PCM has odd byte length {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: 1,
    })
}

fn decode_with_symphonia(bytes: &[u8], extension: &str) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if !extension.is_empty() {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::unsupported(format!("{} ({})", extension, e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::decode("No audio tracks found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::unsupported(format!("codec for {} ({})", extension, e)))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frames are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(AudioError::decode(format!("Failed to decode: {}", e))),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(AudioError::decode("Could not determine sample rate or channel layout"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_hint() {
        assert_eq!(AudioFormat::from_hint("wav"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_hint(".WAV"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_hint("audio/wav"), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_hint("pcm"), AudioFormat::RawPcm);
        assert_eq!(AudioFormat::from_hint("audio/mpeg"), AudioFormat::Probe("mp3".into()));
        assert_eq!(AudioFormat::from_hint("webm"), AudioFormat::Probe("webm".into()));
    }

    #[test]
    fn test_raw_pcm_decoding() {
        let bytes: Vec<u8> = [0i16, 16384, -32768]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let audio = decode_bytes(&bytes, &AudioFormat::RawPcm, 8000).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_raw_pcm_odd_length_rejected() {
        assert!(decode_bytes(&[1, 2, 3], &AudioFormat::RawPcm, 16000).is_err());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(matches!(
            decode_bytes(&[], &AudioFormat::Wav, 16000),
            Err(AudioError::Empty)
        ));
    }

    #[test]
    fn test_garbage_is_not_wav() {
        let garbage = b"definitely not a riff header".to_vec();
        assert!(decode_bytes(&garbage, &AudioFormat::Wav, 16000).is_err());
        assert!(decode_bytes(&garbage, &AudioFormat::from_hint("webm"), 16000).is_err());
    }
}

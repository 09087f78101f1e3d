//! Malsori audio front end
//!
//! Turns an uploaded recording (bytes plus a format hint) into the mono 16kHz
//! `f32` waveform the speech encoder expects.
//!
//! ```text
//! bytes ──> decode (hound / symphonia / raw PCM)
//!             │
//!             ├─> downmix  -> mono
//!             │
//!             └─> Resampler (rubato) -> 16kHz
//! ```

pub mod decode;
pub mod error;
pub mod resampler;

pub use decode::{decode_bytes, AudioFormat, DecodedAudio};
pub use error::{AudioError, Result};
pub use resampler::Resampler;

/// Audio sample rate constant (16kHz for the speech encoder)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Down-mix and resample decoded audio to mono at `target_rate`
pub fn to_mono_at(audio: &DecodedAudio, target_rate: u32) -> Result<Vec<f32>> {
    let mono = Resampler::downmix(&audio.samples, audio.channels);
    Resampler::new(audio.sample_rate, target_rate)?.process(&mono)
}

/// Decode `bytes` and convert them to mono 16kHz samples
///
/// `format_hint` is a file extension or MIME type; `raw_sample_rate` is only
/// consulted for headerless PCM.
pub fn load_for_model(bytes: &[u8], format_hint: &str, raw_sample_rate: u32) -> Result<Vec<f32>> {
    let format = AudioFormat::from_hint(format_hint);
    let decoded = decode_bytes(bytes, &format, raw_sample_rate)?;
    let samples = to_mono_at(&decoded, TARGET_SAMPLE_RATE)?;

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }
    Ok(samples)
}

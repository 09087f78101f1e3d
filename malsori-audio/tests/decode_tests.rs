//! Decoding WAV buffers end to end: header parsing, down-mix and resampling.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use malsori_audio::{decode_bytes, load_for_model, AudioFormat, TARGET_SAMPLE_RATE};

fn wav_bytes(spec: WavSpec, frames: usize, sample: impl Fn(usize, u16) -> f32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..frames {
            for ch in 0..spec.channels {
                let value = sample(i, ch);
                match spec.sample_format {
                    SampleFormat::Float => writer.write_sample(value).unwrap(),
                    SampleFormat::Int => {
                        let scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                        writer.write_sample((value * scale) as i32).unwrap()
                    }
                }
            }
        }
        writer.finalize().unwrap();
    }
    bytes
}

fn tone(i: usize, rate: u32) -> f32 {
    (i as f32 * 220.0 * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.4
}

#[test]
fn test_16k_mono_wav_passes_through() {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let bytes = wav_bytes(spec, 16000, |i, _| tone(i, 16000));

    let samples = load_for_model(&bytes, "wav", 16000).unwrap();
    assert_eq!(samples.len(), 16000);
    assert!((samples[40] - tone(40, 16000)).abs() < 1e-3);
}

#[test]
fn test_stereo_44k_wav_is_downmixed_and_resampled() {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    // Left carries the tone, right is silent: mono is half amplitude
    let bytes = wav_bytes(spec, 44100, |i, ch| if ch == 0 { tone(i, 44100) } else { 0.0 });

    let decoded = decode_bytes(&bytes, &AudioFormat::Wav, 0).unwrap();
    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.sample_rate, 44100);
    assert_eq!(decoded.frames(), 44100);

    let samples = load_for_model(&bytes, "audio/wav", 0).unwrap();
    let expected = TARGET_SAMPLE_RATE as usize;
    assert!(
        samples.len() + 10 >= expected && samples.len() <= expected,
        "expected about {} samples, got {}",
        expected,
        samples.len()
    );
    let peak = samples[1000..].iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    assert!(peak > 0.15 && peak < 0.25, "peak {}", peak);
}

#[test]
fn test_float_and_24bit_wav() {
    let float_spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let decoded = decode_bytes(
        &wav_bytes(float_spec, 100, |_, _| 0.25),
        &AudioFormat::Wav,
        0,
    )
    .unwrap();
    assert!(decoded.samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));

    let int24_spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };
    let decoded = decode_bytes(
        &wav_bytes(int24_spec, 100, |_, _| -0.5),
        &AudioFormat::Wav,
        0,
    )
    .unwrap();
    assert!(decoded.samples.iter().all(|&s| (s + 0.5).abs() < 1e-4));
}

#[test]
fn test_unknown_container_is_an_error_not_a_panic() {
    let result = load_for_model(b"plain text pretending to be a recording", "webm", 16000);
    assert!(result.is_err());
}

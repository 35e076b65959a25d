//! crates/bookchat_core/src/speech.rs
//!
//! Turns the speech endpoint's response (base64 raw PCM plus a mime type) into a
//! playable WAV container.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hound::{WavSpec, WavWriter};

use crate::domain::SynthesizedSpeech;

/// Sample rate assumed when the mime type does not carry a `rate=` parameter.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("audio payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to encode WAV: {0}")]
    Wav(#[from] hound::Error),
    #[error("audio payload is empty")]
    Empty,
}

/// Reads the sample rate from a mime type such as `audio/L16;codec=pcm;rate=24000`.
pub fn sample_rate_from_mime(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| {
            let digits: String = rate.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .filter(|&rate| rate > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Wraps little-endian 16-bit mono PCM in a WAV container.
/// A trailing odd byte is dropped.
pub fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, SpeechError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for chunk in pcm_data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Decodes a synthesized clip and wraps it as WAV, ready for playback.
pub fn wav_from_speech(speech: &SynthesizedSpeech) -> Result<Vec<u8>, SpeechError> {
    let pcm = STANDARD.decode(speech.audio_data.trim())?;
    if pcm.len() < 2 {
        return Err(SpeechError::Empty);
    }
    pcm16_to_wav(&pcm, sample_rate_from_mime(&speech.mime_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_is_read_from_mime_parameters() {
        assert_eq!(sample_rate_from_mime("audio/L16;codec=pcm;rate=24000"), 24_000);
        assert_eq!(sample_rate_from_mime("audio/L16; rate=22050"), 22_050);
        assert_eq!(sample_rate_from_mime("audio/L16"), DEFAULT_SAMPLE_RATE);
        assert_eq!(sample_rate_from_mime("audio/L16;rate=abc"), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn wav_header_matches_pcm_input() {
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let speech = SynthesizedSpeech {
            audio_data: STANDARD.encode(&pcm),
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
        };

        let wav = wav_from_speech(&speech).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        let garbage = SynthesizedSpeech {
            audio_data: "not base64!".to_string(),
            mime_type: "audio/L16".to_string(),
        };
        assert!(matches!(wav_from_speech(&garbage), Err(SpeechError::Base64(_))));

        let empty = SynthesizedSpeech {
            audio_data: String::new(),
            mime_type: "audio/L16".to_string(),
        };
        assert!(matches!(wav_from_speech(&empty), Err(SpeechError::Empty)));
    }
}

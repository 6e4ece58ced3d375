//! Audio payload helpers.
//!
//! Decoding the client's base64 clip, mapping mime types to the formats
//! vendors understand, and unwrapping WAV into raw 16-bit PCM for vendors
//! that only accept headerless audio.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{ProxyError, Result};

/// Container formats the proxy knows how to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    /// Headerless 16-bit little-endian mono PCM.
    Pcm,
    Amr,
    M4a,
}

impl AudioFormat {
    /// Map a browser mime type (`audio/mpeg`, `audio/wav;codecs=1`, ...).
    pub fn from_mime(mime: &str) -> Result<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Ok(Self::Mp3),
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Ok(Self::Wav),
            "audio/pcm" | "audio/l16" | "audio/raw" => Ok(Self::Pcm),
            "audio/amr" => Ok(Self::Amr),
            "audio/m4a" | "audio/mp4" | "audio/x-m4a" | "audio/aac" => Ok(Self::M4a),
            _ => Err(ProxyError::BadRequest(format!(
                "unsupported audio type: {}",
                mime
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
            Self::Amr => "amr",
            Self::M4a => "m4a",
        }
    }
}

/// Decode the client's `audioBase64`, which may carry a `data:` URL prefix.
///
/// Returns the bytes and the mime type from the prefix, if there was one.
pub fn decode_client_audio(encoded: &str) -> Result<(Vec<u8>, Option<String>)> {
    let trimmed = encoded.trim();
    let (mime, payload) = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest.split_once(',').ok_or_else(|| {
                ProxyError::BadRequest("malformed data URL in audioBase64".to_string())
            })?;
            let mime = header.strip_suffix(";base64").unwrap_or(header);
            let mime = mime.split(';').next().unwrap_or_default();
            ((!mime.is_empty()).then(|| mime.to_string()), data)
        }
        None => (None, trimmed),
    };

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ProxyError::BadRequest(format!("audioBase64 is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ProxyError::BadRequest("audioBase64 is empty".to_string()));
    }
    Ok((bytes, mime))
}

/// Sample rate declared in a WAV header.
pub fn wav_sample_rate(wav: &[u8]) -> Result<u32> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| ProxyError::BadRequest(format!("invalid WAV audio: {}", e)))?;
    Ok(reader.spec().sample_rate)
}

/// Strip the RIFF header from a 16-bit mono WAV clip.
///
/// Returns the little-endian PCM bytes and the sample rate.
pub fn wav_to_pcm16(wav: &[u8]) -> Result<(Vec<u8>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| ProxyError::BadRequest(format!("invalid WAV audio: {}", e)))?;
    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err(ProxyError::BadRequest(format!(
            "WAV audio must be 16-bit mono PCM (got {} channel(s), {} bits)",
            spec.channels, spec.bits_per_sample
        )));
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::BadRequest(format!("failed to read WAV samples: {}", e)))?;
    let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    Ok((pcm, spec.sample_rate))
}

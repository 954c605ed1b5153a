//! Wire-level audio helpers: little-endian byte packing and the base64
//! transport encoding the live stream uses for PCM payloads.

use base64::Engine;

/// Encodes i16 PCM samples as base64 over their little-endian bytes.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let bytes: Vec<u8> = pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Decodes a base64 payload into raw PCM bytes. Returns `None` on invalid
/// base64 so callers can skip the payload without failing the session.
pub fn decode_base64(fragment: &str) -> Option<Vec<u8>> {
    match base64::engine::general_purpose::STANDARD.decode(fragment) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!("failed to decode base64 audio payload: {}", e);
            None
        }
    }
}

/// Averages an interleaved capture buffer down to mono. A single-channel
/// buffer is copied as-is.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels > 1 {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        data.to_vec()
    }
}

//! Sample format conversion between the device representation (f32 in
//! [-1.0, 1.0]) and the 16-bit little-endian PCM the live session speaks.
//!
//! Quantization is a plain linear scale by 32768 with clamping. No dithering.

/// Converts captured f32 samples to i16 for transmission.
pub fn quantize_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Decodes little-endian PCM16 bytes into f32 samples. A trailing odd byte is
/// dropped rather than treated as an error.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

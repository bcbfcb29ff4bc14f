//! Conversion between raw byte buffers and signed 16-bit PCM samples.
//!
//! The wire layout is fixed little-endian, matching the raw PCM framing the
//! pipeline speaks on both ends (mono, 16-bit signed, no header). Both
//! directions are round-trip exact.

use crate::error::PipelineError;

/// Serializes samples as little-endian byte pairs.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    #[cfg(target_endian = "little")]
    {
        bytemuck::cast_slice(samples).to_vec()
    }
    #[cfg(not(target_endian = "little"))]
    {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Parses little-endian byte pairs into samples.
///
/// Fails with `MalformedAudioData` if the buffer is not an even number of
/// bytes.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<i16>, PipelineError> {
    if bytes.len() % 2 != 0 {
        return Err(PipelineError::MalformedAudioData { len: bytes.len() });
    }

    #[cfg(target_endian = "little")]
    {
        // pod_collect_to_vec copies, so source alignment does not matter.
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }
    #[cfg(not(target_endian = "little"))]
    {
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}

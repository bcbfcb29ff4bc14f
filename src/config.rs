use std::time::Duration;

use crate::error::PipelineError;

/// Echo suppression strength. Stronger modes remove more echo at the cost of
/// more residual near-end distortion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggressiveness {
    Low,
    #[default]
    Moderate,
    High,
    MostAggressive,
}

/// What to do with an under-sized trailing chunk when a source is exhausted.
/// Decided once at pipeline construction and applied consistently to both
/// streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingPolicy {
    /// Zero-pad the remainder to a full frame.
    #[default]
    PadWithSilence,
    /// Drop the remainder.
    Discard,
}

/// Immutable engine configuration, resolved once before processing begins.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub sample_rate: u32,
    pub samples_per_frame: usize,
    pub aggressiveness: Aggressiveness,
    /// Comfort noise generation to mask the cancellation residue.
    pub comfort_noise: bool,
}

/// Pipeline construction parameters.
///
/// Defaults match the classic mobile AEC setup: 16 kHz 16-bit mono, 10 ms
/// frames (160 samples / 320 bytes), 10 ms initial tail estimate.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub aggressiveness: Aggressiveness,
    pub comfort_noise: bool,
    pub trailing_policy: TrailingPolicy,
    /// Initial far-end to echo delay estimate, forwarded on every
    /// cancellation call until a delay estimator revises it.
    pub initial_tail_ms: u16,
    /// Upper bound for source reads, sink writes and inter-stage handoffs.
    /// `None` means the pipeline waits as long as the streams do.
    pub io_timeout: Option<Duration>,
    /// Frames buffered between stages; clamped to 1..=4 so a slow sink
    /// throttles the reader instead of buffering without bound.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 10,
            aggressiveness: Aggressiveness::default(),
            comfort_noise: true,
            trailing_policy: TrailingPolicy::default(),
            initial_tail_ms: 10,
            io_timeout: None,
            queue_capacity: 2,
        }
    }
}

impl PipelineConfig {
    /// Samples per frame for one mono channel.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize / 1000) * self.frame_duration_ms as usize
    }

    /// Bytes per frame: one little-endian byte pair per sample.
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * 2
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sample_rate: self.sample_rate,
            samples_per_frame: self.samples_per_frame(),
            aggressiveness: self.aggressiveness,
            comfort_noise: self.comfort_noise,
        }
    }

    /// Rejects geometry the frame math cannot represent. Engine-specific
    /// limits (e.g. which sample rates a mobile engine accepts) are checked
    /// by the engine itself at prepare time.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sample_rate < 1000 || self.frame_duration_ms == 0 || self.samples_per_frame() == 0 {
            return Err(PipelineError::EngineInitializationFailed(format!(
                "unusable frame geometry: {} Hz / {} ms frames",
                self.sample_rate, self.frame_duration_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_mobile_aec_geometry() {
        let c = PipelineConfig::default();
        assert_eq!(c.samples_per_frame(), 160);
        assert_eq!(c.frame_bytes(), 320);
        assert_eq!(c.initial_tail_ms, 10);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn engine_options_mirror_config() {
        let c = PipelineConfig {
            aggressiveness: Aggressiveness::MostAggressive,
            comfort_noise: false,
            ..PipelineConfig::default()
        };
        let o = c.engine_options();
        assert_eq!(o.sample_rate, 16_000);
        assert_eq!(o.samples_per_frame, 160);
        assert_eq!(o.aggressiveness, Aggressiveness::MostAggressive);
        assert!(!o.comfort_noise);
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let c = PipelineConfig {
            frame_duration_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(PipelineError::EngineInitializationFailed(_))
        ));
    }
}

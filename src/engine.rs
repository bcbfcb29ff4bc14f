use crate::config::EngineOptions;
use crate::error::PipelineError;

/// Capability interface of an external echo-cancellation engine.
///
/// The pipeline is a client of exactly this surface; the adaptive filtering
/// behind it is somebody else's problem. Implementations hold ordered
/// adaptive state and are never shared across concurrent streams, so `Send`
/// is required but `Sync` is not.
///
/// Contract, enforced by [`EngineSession`](crate::session::EngineSession):
/// `configure` then `prepare` are called once, `buffer_farend` strictly
/// precedes the `process` call for the same frame, and `close` is called
/// exactly once on every exit path (implementations must tolerate `close`
/// in any state).
pub trait AecEngine: Send {
    /// Stores the resolved configuration. Called before `prepare`.
    fn configure(&mut self, options: &EngineOptions) -> Result<(), PipelineError>;

    /// Allocates and initializes the underlying engine. Failures are
    /// reported as `EngineInitializationFailed` and are terminal for the
    /// session.
    fn prepare(&mut self) -> Result<(), PipelineError>;

    /// Hands one far-end frame to the engine's internal reference buffer.
    fn buffer_farend(&mut self, far_end: &[i16]) -> Result<(), PipelineError>;

    /// Cancels echo on one near-end frame, given the current tail estimate
    /// in milliseconds. Returns a cleaned frame of the same length.
    fn process(&mut self, near_end: &[i16], tail_ms: u16) -> Result<Vec<i16>, PipelineError>;

    /// Releases engine resources.
    fn close(&mut self);
}

/// Engine that returns the near-end signal unchanged (for testing/debugging).
///
/// It still enforces the frame-length contract, so it exercises the same
/// failure paths a real engine would.
#[derive(Debug, Default)]
pub struct PassthroughEngine {
    samples_per_frame: usize,
    frames: u64,
}

impl AecEngine for PassthroughEngine {
    fn configure(&mut self, options: &EngineOptions) -> Result<(), PipelineError> {
        self.samples_per_frame = options.samples_per_frame;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), PipelineError> {
        if self.samples_per_frame == 0 {
            return Err(PipelineError::EngineInitializationFailed(
                "configured frame length is zero".into(),
            ));
        }
        Ok(())
    }

    fn buffer_farend(&mut self, far_end: &[i16]) -> Result<(), PipelineError> {
        if far_end.len() != self.samples_per_frame {
            return Err(PipelineError::EngineProcessing {
                frame: self.frames,
                reason: format!(
                    "far-end frame of {} samples, engine expects {}",
                    far_end.len(),
                    self.samples_per_frame
                ),
            });
        }
        Ok(())
    }

    fn process(&mut self, near_end: &[i16], _tail_ms: u16) -> Result<Vec<i16>, PipelineError> {
        if near_end.len() != self.samples_per_frame {
            return Err(PipelineError::EngineProcessing {
                frame: self.frames,
                reason: format!(
                    "near-end frame of {} samples, engine expects {}",
                    near_end.len(),
                    self.samples_per_frame
                ),
            });
        }
        self.frames += 1;
        Ok(near_end.to_vec())
    }

    fn close(&mut self) {}
}

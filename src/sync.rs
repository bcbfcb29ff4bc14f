use crate::error::PipelineError;
use crate::messages::{CleanFrame, FramePair};
use crate::session::{EngineSession, SessionState};

/// External collaborator that revises the tail estimate between frames.
///
/// The classic file demo hard-codes the tail; real deployments measure it.
/// Returning `None` keeps the current estimate.
pub trait DelayEstimator: Send {
    fn estimate(&mut self, frame_index: u64, current_tail_ms: u16) -> Option<u16>;
}

/// Feeds each frame pair to the engine in the only order that works:
/// far-end reference first, then cancellation on the matching near-end
/// frame. Owns the running tail estimate.
pub struct FarNearSynchronizer {
    session: EngineSession,
    tail_ms: u16,
    estimator: Option<Box<dyn DelayEstimator>>,
}

impl FarNearSynchronizer {
    pub fn new(session: EngineSession, initial_tail_ms: u16) -> Self {
        Self {
            session,
            tail_ms: initial_tail_ms,
            estimator: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn DelayEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Current far-end to echo delay estimate in milliseconds.
    pub fn tail_ms(&self) -> u16 {
        self.tail_ms
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn frames_processed(&self) -> u64 {
        self.session.frames_processed()
    }

    /// Registers the pair's far-end frame, then cancels echo on its near-end
    /// frame with the current tail estimate.
    pub fn process_pair(&mut self, pair: FramePair) -> Result<CleanFrame, PipelineError> {
        if let Some(estimator) = self.estimator.as_mut() {
            if let Some(tail_ms) = estimator.estimate(pair.index, self.tail_ms) {
                self.tail_ms = tail_ms;
            }
        }
        self.session.register_reference(&pair.far_end)?;
        let samples = self.session.cancel_echo(&pair.near_end, self.tail_ms)?;
        Ok(CleanFrame {
            index: pair.index,
            samples,
        })
    }

    /// Closes the owned session. Idempotent.
    pub fn close(&mut self) {
        self.session.close();
    }
}

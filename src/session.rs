use tracing::debug;

use crate::config::EngineOptions;
use crate::engine::AecEngine;
use crate::error::PipelineError;

/// Lifecycle of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Prepared,
    Processing,
    /// Terminal: the engine reported a failure. Only `close` is valid.
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Prepared => "prepared",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Owns exactly one engine instance and enforces its lifecycle:
/// configure → prepare → (register_reference, cancel_echo)* → close.
///
/// Register/cancel pairing is enforced with a registered-vs-processed
/// counter, so skipping a registration or registering twice for one frame is
/// structurally impossible rather than a silent quality degradation.
/// `close` runs on every exit path; dropping the session closes it too.
pub struct EngineSession {
    engine: Box<dyn AecEngine>,
    state: SessionState,
    samples_per_frame: usize,
    frames_registered: u64,
    frames_processed: u64,
}

impl EngineSession {
    pub fn new(engine: Box<dyn AecEngine>) -> Self {
        Self {
            engine,
            state: SessionState::Unconfigured,
            samples_per_frame: 0,
            frames_registered: 0,
            frames_processed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames fully processed so far (register + cancel both done).
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    fn misuse(&self, operation: &'static str) -> PipelineError {
        PipelineError::InvalidLifecycleTransition {
            state: self.state.as_str(),
            operation,
        }
    }

    /// Stores the engine configuration. Valid only once, before `prepare`.
    pub fn configure(&mut self, options: &EngineOptions) -> Result<(), PipelineError> {
        if self.state != SessionState::Unconfigured {
            return Err(self.misuse("configure"));
        }
        if let Err(e) = self.engine.configure(options) {
            self.state = SessionState::Failed;
            return Err(e);
        }
        self.samples_per_frame = options.samples_per_frame;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Allocates the underlying engine. A failure here is terminal for the
    /// session.
    pub fn prepare(&mut self) -> Result<(), PipelineError> {
        if self.state != SessionState::Configured {
            return Err(self.misuse("prepare"));
        }
        if let Err(e) = self.engine.prepare() {
            self.state = SessionState::Failed;
            return Err(e);
        }
        self.state = SessionState::Prepared;
        Ok(())
    }

    /// Hands the far-end frame for the next frame index to the engine.
    /// Must be followed by exactly one `cancel_echo` before the next
    /// registration.
    pub fn register_reference(&mut self, far_end: &[i16]) -> Result<(), PipelineError> {
        match self.state {
            SessionState::Prepared | SessionState::Processing => {}
            _ => return Err(self.misuse("register a reference frame")),
        }
        if self.frames_registered > self.frames_processed {
            return Err(self.misuse("register a second reference frame for one index"));
        }
        if let Err(e) = self.engine.buffer_farend(far_end) {
            self.state = SessionState::Failed;
            return Err(e);
        }
        self.frames_registered += 1;
        self.state = SessionState::Processing;
        Ok(())
    }

    /// Cancels echo on the near-end frame paired with the last registered
    /// reference. Returns the cleaned frame, same length as the input.
    pub fn cancel_echo(
        &mut self,
        near_end: &[i16],
        tail_ms: u16,
    ) -> Result<Vec<i16>, PipelineError> {
        if self.state != SessionState::Processing {
            return Err(self.misuse("cancel echo"));
        }
        if self.frames_registered != self.frames_processed + 1 {
            return Err(self.misuse("cancel echo without a registered reference frame"));
        }
        let cleaned = match self.engine.process(near_end, tail_ms) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        if cleaned.len() != near_end.len() {
            self.state = SessionState::Failed;
            return Err(PipelineError::EngineProcessing {
                frame: self.frames_processed,
                reason: format!(
                    "engine returned {} samples for a {}-sample frame",
                    cleaned.len(),
                    near_end.len()
                ),
            });
        }
        self.frames_processed += 1;
        Ok(cleaned)
    }

    /// Releases engine resources. Idempotent; valid from any state.
    pub fn close(&mut self) {
        match self.state {
            SessionState::Closed => {}
            SessionState::Unconfigured | SessionState::Configured => {
                // Engine was never prepared; nothing to release.
                self.state = SessionState::Closed;
            }
            SessionState::Prepared | SessionState::Processing | SessionState::Failed => {
                debug!(
                    frames = self.frames_processed,
                    state = self.state.as_str(),
                    "closing engine session"
                );
                self.engine.close();
                self.state = SessionState::Closed;
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}

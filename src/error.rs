use std::io;
use thiserror::Error;

/// Every failure the pipeline can surface. No variant is swallowed or merely
/// logged; each one propagates to the caller after the engine session has
/// been closed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Byte buffer length is not a whole number of 16-bit samples.
    #[error("malformed audio data: {len} bytes is not a whole number of 16-bit samples")]
    MalformedAudioData { len: usize },

    #[error("failed to read from source")]
    SourceRead(#[source] io::Error),

    #[error("failed to write to sink")]
    SinkWrite(#[source] io::Error),

    /// Programmer error: a session operation was called from the wrong state
    /// or out of register/cancel order. Never retried.
    #[error("invalid lifecycle transition: cannot {operation} while {state}")]
    InvalidLifecycleTransition {
        state: &'static str,
        operation: &'static str,
    },

    /// The underlying engine could not be allocated or initialized.
    /// Terminal for the session.
    #[error("engine initialization failed: {0}")]
    EngineInitializationFailed(String),

    /// The engine rejected a processing call. The run is aborted rather than
    /// skipping frames; a cancellation stream cannot tolerate gaps.
    #[error("engine processing failed at frame {frame}: {reason}")]
    EngineProcessing { frame: u64, reason: String },

    /// Far-end and near-end sources disagree on frame count by more than the
    /// one-frame tolerance.
    #[error("stream length mismatch: far-end produced {far_frames} frames, near-end {near_frames}")]
    StreamLengthMismatch { far_frames: u64, near_frames: u64 },

    /// A source read, sink write, or inter-stage handoff exceeded the
    /// configured timeout. Transient: the caller may retry the whole run.
    #[error("i/o timed out during {stage}")]
    IoTimeout { stage: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = PipelineError::StreamLengthMismatch {
            far_frames: 10,
            near_frames: 8,
        };
        let msg = e.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("8"));
    }

    #[test]
    fn source_read_preserves_io_error() {
        use std::error::Error;
        let inner = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let e = PipelineError::SourceRead(inner);
        assert!(e.source().is_some());
    }
}

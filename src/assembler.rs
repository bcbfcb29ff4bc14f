use std::io::{ErrorKind, Read};

use crate::config::TrailingPolicy;
use crate::error::PipelineError;

/// Turns an ordered byte stream into a lazy, finite sequence of fixed-size
/// frame buffers.
///
/// The assembler never buffers more than one frame ahead, so memory stays
/// O(frame size) regardless of stream length. Once it has reported
/// end-of-stream or an error, it stays exhausted.
pub struct FrameAssembler<R: Read> {
    source: R,
    frame_bytes: usize,
    trailing_policy: TrailingPolicy,
    finished: bool,
}

impl<R: Read> FrameAssembler<R> {
    pub fn new(source: R, frame_bytes: usize, trailing_policy: TrailingPolicy) -> Self {
        Self {
            source,
            frame_bytes,
            trailing_policy,
            finished: false,
        }
    }

    /// Pulls the next full frame from the source.
    ///
    /// Returns `Ok(None)` as the terminal end-of-stream marker. An
    /// under-sized trailing chunk is zero-padded or discarded per the
    /// configured policy.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, PipelineError> {
        if self.finished {
            return Ok(None);
        }

        let mut frame = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < self.frame_bytes {
            match self.source.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    self.finished = true;
                    return Err(PipelineError::IoTimeout {
                        stage: "source read",
                    });
                }
                Err(e) => {
                    self.finished = true;
                    return Err(PipelineError::SourceRead(e));
                }
            }
        }

        if filled == self.frame_bytes {
            return Ok(Some(frame));
        }

        self.finished = true;
        if filled == 0 {
            return Ok(None);
        }
        match self.trailing_policy {
            // The tail past `filled` is still zeroed silence.
            TrailingPolicy::PadWithSilence => Ok(Some(frame)),
            TrailingPolicy::Discard => Ok(None),
        }
    }
}

//! Streaming, frame-synchronous acoustic echo cancellation pipeline.
//!
//! Turns two unbounded PCM byte streams (a far-end reference signal and a
//! near-end captured signal) into fixed 16-bit little-endian frames, feeds
//! them to an external AEC engine in the strict reference-then-cancel order
//! the engine's adaptive state requires, and re-serializes the cleaned audio
//! to a sink. Memory use is bounded by the frame size and the inter-stage
//! queue capacity, never by stream length.
//!
//! The cancellation algorithm itself is not part of this crate: implement
//! [`AecEngine`] over your engine of choice and hand it to [`Pipeline::run`].
//! [`PassthroughEngine`] is provided for wiring tests.

mod assembler;
mod codec;
mod config;
mod engine;
mod error;
mod messages;
mod pipeline;
mod session;
mod stats;
mod sync;

pub use assembler::FrameAssembler;
pub use codec::{decode_samples, encode_samples};
pub use config::{Aggressiveness, EngineOptions, PipelineConfig, TrailingPolicy};
pub use engine::{AecEngine, PassthroughEngine};
pub use error::PipelineError;
pub use messages::{CleanFrame, FramePair};
pub use pipeline::{Pipeline, PipelineReport};
pub use session::{EngineSession, SessionState};
pub use stats::{RuntimeStats, RuntimeStatsHandle, StageStats};
pub use sync::{DelayEstimator, FarNearSynchronizer};

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, warn};

use crate::assembler::FrameAssembler;
use crate::codec::{decode_samples, encode_samples};
use crate::config::{PipelineConfig, TrailingPolicy};
use crate::engine::AecEngine;
use crate::error::PipelineError;
use crate::messages::{CleanFrame, FramePair};
use crate::session::EngineSession;
use crate::stats::{RuntimeStats, RuntimeStatsHandle};
use crate::sync::{DelayEstimator, FarNearSynchronizer};

/// Outcome of a completed (or cancelled) run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub frames_processed: u64,
    pub bytes_written: u64,
    /// True when the run stopped on the caller's signal instead of stream
    /// exhaustion.
    pub cancelled: bool,
}

/// Drives byte streams end to end: reader → engine → writer, one frame pair
/// at a time, across three stages joined by bounded channels.
///
/// The pipeline borrows its sources and sink (their owners close them) but
/// exclusively owns the engine session it builds per run, and closes it on
/// every exit path. One run equals one engine session; the engine's adaptive
/// state is ordered, so only the middle stage touches it.
pub struct Pipeline {
    config: PipelineConfig,
    stats: RuntimeStatsHandle,
}

/// What the engine stage should do next.
enum Step {
    Pair(FramePair),
    Done,
    Cancelled,
    TimedOut,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            stats: RuntimeStatsHandle::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Snapshot of the counters and stage timings of the most recent run.
    pub fn stats(&self) -> RuntimeStats {
        self.stats.snapshot()
    }

    /// Runs until both sources are exhausted, a failure occurs, or a message
    /// arrives on `stop_rx`.
    ///
    /// Dropping the stop sender also cancels the run; callers that never
    /// cancel should use [`run_to_end`](Self::run_to_end).
    pub fn run<F, N, W>(
        &self,
        far_source: F,
        near_source: N,
        sink: W,
        engine: Box<dyn AecEngine>,
        stop_rx: Receiver<()>,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: Read + Send,
        N: Read + Send,
        W: Write + Send,
    {
        self.run_inner(far_source, near_source, sink, engine, None, stop_rx)
    }

    /// [`run`](Self::run) without a cancellation signal.
    pub fn run_to_end<F, N, W>(
        &self,
        far_source: F,
        near_source: N,
        sink: W,
        engine: Box<dyn AecEngine>,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: Read + Send,
        N: Read + Send,
        W: Write + Send,
    {
        self.run_inner(far_source, near_source, sink, engine, None, never())
    }

    /// [`run`](Self::run) with a delay estimator revising the tail estimate
    /// between frames.
    pub fn run_with_estimator<F, N, W>(
        &self,
        far_source: F,
        near_source: N,
        sink: W,
        engine: Box<dyn AecEngine>,
        estimator: Box<dyn DelayEstimator>,
        stop_rx: Receiver<()>,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: Read + Send,
        N: Read + Send,
        W: Write + Send,
    {
        self.run_inner(
            far_source,
            near_source,
            sink,
            engine,
            Some(estimator),
            stop_rx,
        )
    }

    fn run_inner<F, N, W>(
        &self,
        far_source: F,
        near_source: N,
        sink: W,
        engine: Box<dyn AecEngine>,
        estimator: Option<Box<dyn DelayEstimator>>,
        stop_rx: Receiver<()>,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: Read + Send,
        N: Read + Send,
        W: Write + Send,
    {
        self.stats.reset();
        debug!(
            sample_rate = self.config.sample_rate,
            samples_per_frame = self.config.samples_per_frame(),
            tail_ms = self.config.initial_tail_ms,
            "starting pipeline run"
        );

        let mut session = EngineSession::new(engine);
        session.configure(&self.config.engine_options())?;
        session.prepare()?;
        let mut sync = FarNearSynchronizer::new(session, self.config.initial_tail_ms);
        if let Some(estimator) = estimator {
            sync = sync.with_estimator(estimator);
        }

        let outcome = self.run_stages(far_source, near_source, sink, &mut sync, &stop_rx);
        // Guaranteed close, success or not.
        sync.close();

        match outcome {
            Ok((bytes_written, cancelled)) => {
                debug!(
                    frames = sync.frames_processed(),
                    bytes_written, cancelled, "pipeline run finished"
                );
                Ok(PipelineReport {
                    frames_processed: sync.frames_processed(),
                    bytes_written,
                    cancelled,
                })
            }
            Err(e) => {
                self.stats.record_error();
                warn!(error = %e, "pipeline run failed");
                Err(e)
            }
        }
    }

    fn run_stages<F, N, W>(
        &self,
        far_source: F,
        near_source: N,
        sink: W,
        sync: &mut FarNearSynchronizer,
        stop_rx: &Receiver<()>,
    ) -> Result<(u64, bool), PipelineError>
    where
        F: Read + Send,
        N: Read + Send,
        W: Write + Send,
    {
        let capacity = self.config.queue_capacity.clamp(1, 4);
        let frame_bytes = self.config.frame_bytes();
        let trailing_policy = self.config.trailing_policy;
        let io_timeout = self.config.io_timeout;
        let (pair_tx, pair_rx) = bounded::<FramePair>(capacity);
        let (clean_tx, clean_rx) = bounded::<CleanFrame>(capacity);
        let stats = self.stats.clone();

        thread::scope(|scope| {
            let reader_stats = stats.clone();
            let reader = scope.spawn(move || {
                read_pairs(
                    far_source,
                    near_source,
                    frame_bytes,
                    trailing_policy,
                    io_timeout,
                    pair_tx,
                    &reader_stats,
                )
            });
            let writer_stats = stats.clone();
            let writer =
                scope.spawn(move || write_frames(sink, io_timeout, clean_rx, &writer_stats));

            let mut engine_error: Option<PipelineError> = None;
            let mut cancelled = false;
            loop {
                let pair = match next_step(&pair_rx, stop_rx, io_timeout) {
                    Step::Pair(pair) => pair,
                    Step::Done => break,
                    Step::Cancelled => {
                        debug!("cancellation requested, stopping frame pulls");
                        cancelled = true;
                        break;
                    }
                    Step::TimedOut => {
                        engine_error = Some(PipelineError::IoTimeout {
                            stage: "frame handoff to engine stage",
                        });
                        break;
                    }
                };

                let start = Instant::now();
                match sync.process_pair(pair) {
                    Ok(clean) => {
                        stats.update(|s| {
                            s.engine_stage.record(start.elapsed());
                            s.frames_out += 1;
                        });
                        match send_with_timeout(&clean_tx, clean, io_timeout, "cleaned-frame handoff") {
                            Ok(true) => {}
                            // Writer hung up; its own error surfaces below.
                            Ok(false) => break,
                            Err(e) => {
                                engine_error = Some(e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        engine_error = Some(e);
                        break;
                    }
                }
            }

            // Hang up both queues so the stages unblock and finish.
            drop(clean_tx);
            drop(pair_rx);
            let reader_result = join_stage(reader);
            let writer_result = join_stage(writer);

            if let Some(e) = engine_error {
                return Err(e);
            }
            reader_result?;
            let bytes_written = writer_result?;
            Ok((bytes_written, cancelled))
        })
    }
}

fn join_stage<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn next_step(
    pair_rx: &Receiver<FramePair>,
    stop_rx: &Receiver<()>,
    io_timeout: Option<Duration>,
) -> Step {
    let on_msg = |msg: Result<FramePair, _>| msg.map(Step::Pair).unwrap_or(Step::Done);
    if let Some(timeout) = io_timeout {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => Step::Cancelled,
            recv(pair_rx) -> msg => on_msg(msg),
            default(timeout) => Step::TimedOut,
        }
    } else {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => Step::Cancelled,
            recv(pair_rx) -> msg => on_msg(msg),
        }
    }
}

/// Ok(true) = delivered, Ok(false) = downstream hung up.
fn send_with_timeout<T>(
    tx: &Sender<T>,
    value: T,
    io_timeout: Option<Duration>,
    stage: &'static str,
) -> Result<bool, PipelineError> {
    match io_timeout {
        Some(timeout) => match tx.send_timeout(value, timeout) {
            Ok(()) => Ok(true),
            Err(SendTimeoutError::Timeout(_)) => Err(PipelineError::IoTimeout { stage }),
            Err(SendTimeoutError::Disconnected(_)) => Ok(false),
        },
        None => Ok(tx.send(value).is_ok()),
    }
}

/// Reader stage: pulls one frame from each source per iteration, decodes, and
/// forwards index-stamped pairs in strict source order.
fn read_pairs<F: Read, N: Read>(
    far_source: F,
    near_source: N,
    frame_bytes: usize,
    trailing_policy: TrailingPolicy,
    io_timeout: Option<Duration>,
    pair_tx: Sender<FramePair>,
    stats: &RuntimeStatsHandle,
) -> Result<(), PipelineError> {
    let mut far = FrameAssembler::new(far_source, frame_bytes, trailing_policy);
    let mut near = FrameAssembler::new(near_source, frame_bytes, trailing_policy);
    let mut index: u64 = 0;

    loop {
        let start = Instant::now();
        let far_frame = far.next_frame()?;
        let near_frame = near.next_frame()?;
        let pair = match (far_frame, near_frame) {
            (Some(f), Some(n)) => FramePair {
                index,
                far_end: decode_samples(&f)?,
                near_end: decode_samples(&n)?,
            },
            (None, None) => return Ok(()),
            (Some(_), None) => {
                // One unmatched trailing frame is tolerated and dropped;
                // anything more is a broken pairing.
                if far.next_frame()?.is_some() {
                    return Err(PipelineError::StreamLengthMismatch {
                        far_frames: index + 2,
                        near_frames: index,
                    });
                }
                return Ok(());
            }
            (None, Some(_)) => {
                if near.next_frame()?.is_some() {
                    return Err(PipelineError::StreamLengthMismatch {
                        far_frames: index,
                        near_frames: index + 2,
                    });
                }
                return Ok(());
            }
        };

        stats.update(|s| {
            s.frames_in_far += 1;
            s.frames_in_near += 1;
            s.reader_stage.record(start.elapsed());
        });
        index += 1;

        if !send_with_timeout(&pair_tx, pair, io_timeout, "frame handoff from reader")? {
            // Engine stage hung up (failure or cancellation downstream).
            return Ok(());
        }
    }
}

/// Writer stage: re-serializes cleaned frames and pushes them to the sink.
fn write_frames<W: Write>(
    mut sink: W,
    io_timeout: Option<Duration>,
    clean_rx: Receiver<CleanFrame>,
    stats: &RuntimeStatsHandle,
) -> Result<u64, PipelineError> {
    let mut bytes_written: u64 = 0;
    loop {
        let frame = match io_timeout {
            Some(timeout) => match clean_rx.recv_timeout(timeout) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(PipelineError::IoTimeout {
                        stage: "cleaned-frame handoff to writer",
                    })
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match clean_rx.recv() {
                Ok(frame) => frame,
                Err(_) => break,
            },
        };

        let start = Instant::now();
        let bytes = encode_samples(&frame.samples);
        sink.write_all(&bytes).map_err(map_sink_error)?;
        bytes_written += bytes.len() as u64;
        stats.update(|s| {
            s.bytes_written = bytes_written;
            s.writer_stage.record(start.elapsed());
        });
    }
    sink.flush().map_err(map_sink_error)?;
    Ok(bytes_written)
}

fn map_sink_error(e: io::Error) -> PipelineError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => PipelineError::IoTimeout {
            stage: "sink write",
        },
        _ => PipelineError::SinkWrite(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Aggressiveness, TrailingPolicy};
    use crate::engine::PassthroughEngine;
    use std::io::Cursor;

    fn config() -> PipelineConfig {
        PipelineConfig {
            aggressiveness: Aggressiveness::MostAggressive,
            ..PipelineConfig::default()
        }
    }

    fn pcm_bytes(frames: usize) -> Vec<u8> {
        let samples: Vec<i16> = (0..frames * 160).map(|i| i as i16).collect();
        encode_samples(&samples)
    }

    #[test]
    fn passthrough_run_is_byte_identical() {
        let input = pcm_bytes(10);
        assert_eq!(input.len(), 3200);
        let mut output = Vec::new();

        let pipeline = Pipeline::new(config()).unwrap();
        let report = pipeline
            .run_to_end(
                Cursor::new(input.clone()),
                Cursor::new(input.clone()),
                &mut output,
                Box::new(PassthroughEngine::default()),
            )
            .unwrap();

        assert_eq!(report.frames_processed, 10);
        assert_eq!(report.bytes_written, 3200);
        assert!(!report.cancelled);
        assert_eq!(output, input);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_in_far, 10);
        assert_eq!(stats.frames_in_near, 10);
        assert_eq!(stats.frames_out, 10);
        assert_eq!(stats.bytes_written, 3200);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn two_frame_length_mismatch_fails() {
        let pipeline = Pipeline::new(config()).unwrap();
        let err = pipeline
            .run_to_end(
                Cursor::new(pcm_bytes(10)),
                Cursor::new(pcm_bytes(8)),
                Vec::<u8>::new(),
                Box::new(PassthroughEngine::default()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StreamLengthMismatch {
                far_frames: 10,
                near_frames: 8,
            }
        ));
    }

    #[test]
    fn one_extra_frame_is_tolerated() {
        let mut output = Vec::new();
        let pipeline = Pipeline::new(config()).unwrap();
        let report = pipeline
            .run_to_end(
                Cursor::new(pcm_bytes(4)),
                Cursor::new(pcm_bytes(3)),
                &mut output,
                Box::new(PassthroughEngine::default()),
            )
            .unwrap();
        assert_eq!(report.frames_processed, 3);
        assert_eq!(output.len(), 3 * 320);
    }

    #[test]
    fn pad_policy_rounds_the_tail_up() {
        // 2 full frames plus 100 trailing bytes on both streams.
        let mut input = pcm_bytes(2);
        input.extend(std::iter::repeat(1u8).take(100));
        let mut output = Vec::new();

        let pipeline = Pipeline::new(config()).unwrap();
        let report = pipeline
            .run_to_end(
                Cursor::new(input.clone()),
                Cursor::new(input),
                &mut output,
                Box::new(PassthroughEngine::default()),
            )
            .unwrap();
        assert_eq!(report.frames_processed, 3);
        // The padded tail is silence.
        assert_eq!(&output[2 * 320 + 100..], &[0u8; 220][..]);
    }

    #[test]
    fn discard_policy_rounds_the_tail_down() {
        let mut input = pcm_bytes(2);
        input.extend(std::iter::repeat(1u8).take(100));
        let mut output = Vec::new();

        let pipeline = Pipeline::new(PipelineConfig {
            trailing_policy: TrailingPolicy::Discard,
            ..config()
        })
        .unwrap();
        let report = pipeline
            .run_to_end(
                Cursor::new(input.clone()),
                Cursor::new(input),
                &mut output,
                Box::new(PassthroughEngine::default()),
            )
            .unwrap();
        assert_eq!(report.frames_processed, 2);
        assert_eq!(output.len(), 2 * 320);
    }

    #[test]
    fn cancellation_stops_an_unbounded_run() {
        let (stop_tx, stop_rx) = bounded(1);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            let _ = stop_tx.send(());
        });

        let pipeline = Pipeline::new(config()).unwrap();
        let report = pipeline
            .run(
                io::repeat(0),
                io::repeat(0),
                io::sink(),
                Box::new(PassthroughEngine::default()),
                stop_rx,
            )
            .unwrap();
        stopper.join().expect("stopper thread");

        assert!(report.cancelled);
        assert!(report.frames_processed > 0);
    }

    /// Source whose reads stall longer than the configured timeout.
    struct StallingSource;
    impl Read for StallingSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(200));
            Err(io::Error::new(io::ErrorKind::TimedOut, "stalled"))
        }
    }

    #[test]
    fn stalled_source_times_out() {
        let pipeline = Pipeline::new(PipelineConfig {
            io_timeout: Some(Duration::from_millis(20)),
            ..config()
        })
        .unwrap();
        let err = pipeline
            .run_to_end(
                StallingSource,
                StallingSource,
                io::sink(),
                Box::new(PassthroughEngine::default()),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::IoTimeout { .. }));
    }

    #[test]
    fn sink_failure_surfaces_as_sink_write() {
        struct BrokenSink;
        impl Write for BrokenSink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let pipeline = Pipeline::new(config()).unwrap();
        let err = pipeline
            .run_to_end(
                Cursor::new(pcm_bytes(4)),
                Cursor::new(pcm_bytes(4)),
                BrokenSink,
                Box::new(PassthroughEngine::default()),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::SinkWrite(_)));
        assert_eq!(pipeline.stats().errors, 1);
    }
}

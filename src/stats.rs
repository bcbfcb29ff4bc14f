use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timing accumulator for one pipeline stage.
#[derive(Clone, Debug, Default)]
pub struct StageStats {
    pub samples: u64,
    pub total_ns: u128,
    pub max_ns: u64,
}

impl StageStats {
    pub fn record(&mut self, elapsed: Duration) {
        let ns = elapsed.as_nanos();
        self.samples += 1;
        self.total_ns += ns;
        self.max_ns = self.max_ns.max(ns as u64);
    }

    pub fn avg_ns(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_ns as f64 / self.samples as f64
        }
    }
}

/// Counters and per-stage timings for one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub frames_in_far: u64,
    pub frames_in_near: u64,
    pub frames_out: u64,
    pub bytes_written: u64,
    /// Failed runs: any error surfaced by the reader, engine, or writer stage.
    pub errors: u64,

    pub reader_stage: StageStats,
    pub engine_stage: StageStats,
    pub writer_stage: StageStats,
}

/// Shared handle for updating stats from the pipeline's stage threads.
#[derive(Clone, Default)]
pub struct RuntimeStatsHandle {
    inner: Arc<Mutex<RuntimeStats>>,
}

impl RuntimeStatsHandle {
    pub fn reset(&self) {
        if let Ok(mut stats) = self.inner.lock() {
            *stats = RuntimeStats::default();
        }
    }

    pub fn update<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut RuntimeStats),
    {
        if let Ok(mut stats) = self.inner.lock() {
            update_fn(&mut stats);
        }
    }

    pub fn record_error(&self) {
        self.update(|s| s.errors += 1);
    }

    pub fn snapshot(&self) -> RuntimeStats {
        if let Ok(stats) = self.inner.lock() {
            stats.clone()
        } else {
            RuntimeStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_updates_and_snapshot() {
        let h = RuntimeStatsHandle::default();
        h.update(|s| {
            s.frames_in_far += 2;
            s.engine_stage.record(Duration::from_millis(1));
        });
        let snap = h.snapshot();
        assert_eq!(snap.frames_in_far, 2);
        assert_eq!(snap.engine_stage.samples, 1);
        assert_eq!(snap.engine_stage.max_ns, 1_000_000);
    }

    #[test]
    fn reset_clears_everything() {
        let h = RuntimeStatsHandle::default();
        h.update(|s| s.frames_out = 7);
        h.record_error();
        h.reset();
        let snap = h.snapshot();
        assert_eq!(snap.frames_out, 0);
        assert_eq!(snap.errors, 0);
    }

    #[test]
    fn avg_is_zero_without_samples() {
        assert_eq!(StageStats::default().avg_ns(), 0.0);
    }
}

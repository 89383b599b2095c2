//! Phase instrumentation for the convolution engines.
//!
//! Engines take an optional [`PhaseRecorder`] and wrap each im2col / GEMM / col2im / replicate /
//! reduce / bias step in a [`PhaseTimer`]. Nothing is recorded when no recorder is installed and
//! there is no process-wide state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConvPhase {
    Im2Col,
    Gemm,
    Col2Im,
    Replicate,
    Reduce,
    Bias,
}

impl ConvPhase {
    pub const ALL: [ConvPhase; 6] = [
        ConvPhase::Im2Col,
        ConvPhase::Gemm,
        ConvPhase::Col2Im,
        ConvPhase::Replicate,
        ConvPhase::Reduce,
        ConvPhase::Bias,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConvPhase::Im2Col => "im2col",
            ConvPhase::Gemm => "gemm",
            ConvPhase::Col2Im => "col2im",
            ConvPhase::Replicate => "replicate",
            ConvPhase::Reduce => "reduce",
            ConvPhase::Bias => "bias",
        }
    }
}

impl fmt::Display for ConvPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sink for phase timings
pub trait PhaseRecorder: Send + Sync {
    fn record(&self, phase: ConvPhase, elapsed: Duration);
}

/// Records the time between its creation and its drop
pub struct PhaseTimer<'a> {
    recorder: Option<&'a dyn PhaseRecorder>,
    phase: ConvPhase,
    start: Instant,
}

impl<'a> PhaseTimer<'a> {
    pub fn start(recorder: Option<&'a dyn PhaseRecorder>, phase: ConvPhase) -> Self {
        Self {
            recorder,
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder {
            recorder.record(self.phase, self.start.elapsed());
        }
    }
}

/// Accumulated calls and time for one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTotals {
    pub calls: u64,
    pub total: Duration,
}

impl PhaseTotals {
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

/// Recorder that sums durations and call counts per phase
#[derive(Debug, Default)]
pub struct PhaseStats {
    inner: Mutex<HashMap<ConvPhase, PhaseTotals>>,
}

impl PhaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the totals, taking over a poisoned mutex
    fn lock(&self) -> MutexGuard<'_, HashMap<ConvPhase, PhaseTotals>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn totals(&self, phase: ConvPhase) -> PhaseTotals {
        self.lock().get(&phase).copied().unwrap_or_default()
    }

    pub fn calls(&self, phase: ConvPhase) -> u64 {
        self.totals(phase).calls
    }

    /// Clear all recorded statistics
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// One line per phase that was hit at least once
    pub fn report(&self) -> String {
        let mut report = String::new();
        for phase in ConvPhase::ALL {
            let totals = self.totals(phase);
            if totals.calls > 0 {
                report.push_str(&format!(
                    "{phase:>9}: {} calls, {:?} total, {:?} avg\n",
                    totals.calls,
                    totals.total,
                    totals.average()
                ));
            }
        }
        report
    }
}

impl PhaseRecorder for PhaseStats {
    fn record(&self, phase: ConvPhase, elapsed: Duration) {
        let mut inner = self.lock();
        let entry = inner.entry(phase).or_default();
        entry.calls += 1;
        entry.total += elapsed;
    }
}

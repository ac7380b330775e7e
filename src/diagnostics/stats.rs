use parking_lot::Mutex;
use serde::Serialize;

/// Running inference latency statistics for the active model selection.
///
/// `min_ms` starts at a sentinel above any plausible latency so the first
/// observation always replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    min_ms: f64,
    sum_ms: f64,
    count: u64,
    last_ms: Option<f64>,
}

/// Snapshot of latency stats for display and serialisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub count: u64,
    pub min_ms: Option<f64>,
    pub average_ms: Option<f64>,
    pub latest_ms: Option<f64>,
}

impl RunningStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            min_ms: f64::INFINITY,
            sum_ms: 0.0,
            count: 0,
            last_ms: None,
        }
    }

    /// Record one inference latency in milliseconds.
    pub fn observe(&mut self, latency_ms: f64) {
        self.count += 1;
        self.sum_ms += latency_ms;
        self.min_ms = self.min_ms.min(latency_ms);
        self.last_ms = Some(latency_ms);
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum_ms
    }

    /// Fastest observed latency, `None` before the first observation.
    pub fn min_ms(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min_ms)
    }

    /// Mean latency, defined only once something has been observed.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_ms / self.count as f64)
    }

    /// Most recent latency.
    pub fn last_ms(&self) -> Option<f64> {
        self.last_ms
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            count: self.count,
            min_ms: self.min_ms(),
            average_ms: self.average(),
            latest_ms: self.last_ms,
        }
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

struct TrackerState {
    stats: RunningStats,
    accepted: Option<u64>,
}

/// Latency stats scoped to the analyzer generation currently installed.
///
/// Written from the inference worker, read from the consumer side; all
/// access goes through one mutex. Samples tagged with any generation other
/// than the accepted one are ignored, so a frame finishing on a superseded
/// session never lands in the new selection's numbers.
pub struct LatencyTracker {
    state: Mutex<TrackerState>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                stats: RunningStats::new(),
                accepted: None,
            }),
        }
    }

    /// A new selection was requested: start its window from zero.
    ///
    /// This is the only reset per selection change. Samples from the
    /// analyzer still installed are ignored from here on, so nothing lands
    /// in the window before the new generation is activated.
    pub fn begin_switch(&self, generation: u64) {
        let mut state = self.state.lock();
        state.stats.reset();
        state.accepted = None;
        tracing::debug!("latency stats reset for pending generation {generation}");
    }

    /// The analyzer for `generation` is being installed: accept only its
    /// samples from now on.
    pub fn activate(&self, generation: u64) {
        self.state.lock().accepted = Some(generation);
    }

    /// A pending switch failed: go back to counting the analyzer that stayed
    /// installed, continuing the window opened by `begin_switch`.
    pub fn resume(&self, generation: u64) {
        self.state.lock().accepted = Some(generation);
        tracing::debug!("latency stats resumed for installed generation {generation}");
    }

    /// Stop accepting samples from any generation.
    pub fn deactivate(&self) {
        self.state.lock().accepted = None;
    }

    /// Record a latency sample. Returns the updated snapshot, or `None` when
    /// the sample came from a generation that is not accepted.
    pub fn observe(&self, generation: u64, latency_ms: f64) -> Option<StatsSnapshot> {
        let mut state = self.state.lock();
        if state.accepted != Some(generation) {
            return None;
        }
        state.stats.observe(latency_ms);
        Some(state.stats.snapshot())
    }

    pub fn accepted_generation(&self) -> Option<u64> {
        self.state.lock().accepted
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.state.lock().stats.snapshot()
    }

    /// Copy of the current stats.
    pub fn stats(&self) -> RunningStats {
        self.state.lock().stats.clone()
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

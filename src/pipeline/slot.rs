use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::capture::frame::Frame;
use crate::pipeline::analyzer::Analyzer;

/// What happened to a frame offered to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The installed analyzer produced a result.
    Processed,
    /// The installed analyzer ran but skipped the frame.
    Failed,
    /// Nothing is installed; the frame was dropped.
    NoAnalyzer,
    /// Another frame was still in flight; the frame was dropped.
    Busy,
}

/// Holds the single active analyzer.
///
/// Frames run under a read lock and installs take the write lock, so a swap
/// waits for the frame in flight to finish and every later frame sees the
/// new analyzer. At most one frame is processed at a time; a frame offered
/// while another is running is dropped rather than queued.
pub struct AnalyzerSlot {
    current: RwLock<Option<Arc<Analyzer>>>,
    in_flight: AtomicBool,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Clears the in-flight flag even if the analyzer panics.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AnalyzerSlot {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Replace the installed analyzer in one step, returning the previous
    /// one. Dropping the returned analyzer releases its session.
    pub fn install(&self, analyzer: Arc<Analyzer>) -> Option<Arc<Analyzer>> {
        let generation = analyzer.generation();
        let selection = analyzer.selection();
        let previous = self.current.write().replace(analyzer);
        tracing::info!(
            "installed analyzer for {selection} (generation {generation}), replaced {}",
            previous
                .as_ref()
                .map(|p| format!("generation {}", p.generation()))
                .unwrap_or_else(|| "nothing".to_string())
        );
        previous
    }

    /// Detach the installed analyzer, leaving the slot empty.
    pub fn clear(&self) -> Option<Arc<Analyzer>> {
        self.current.write().take()
    }

    /// Offer a frame to the installed analyzer.
    pub fn process(&self, frame: &Frame) -> FrameOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::Busy;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let current = self.current.read();
        let Some(analyzer) = current.as_ref() else {
            return FrameOutcome::NoAnalyzer;
        };

        match analyzer.process_frame(frame) {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::Processed
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::Failed
            }
        }
    }

    /// Handle to the installed analyzer, if any.
    pub fn current(&self) -> Option<Arc<Analyzer>> {
        self.current.read().clone()
    }

    /// Generation of the installed analyzer, if any.
    pub fn installed_generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|a| a.generation())
    }

    pub fn is_installed(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Frames that produced a result.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Frames the analyzer skipped because of an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Frames dropped because another frame was in flight.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for AnalyzerSlot {
    fn default() -> Self {
        Self::new()
    }
}

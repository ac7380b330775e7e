use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::diagnostics::stats::LatencyTracker;
use crate::engine::backend::InferenceEngine;
use crate::model::assets::ModelAssetStore;
use crate::model::types::ModelSelection;
use crate::pipeline::analyzer::{Analyzer, AnalyzerOptions, ResultCallback};
use crate::pipeline::error::{PipelineError, Result};
use crate::pipeline::slot::AnalyzerSlot;

/// How a completed switch request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The new analyzer is installed and receiving frames.
    Installed {
        generation: u64,
        selection: ModelSelection,
    },
    /// A newer request (or shutdown) overtook this one; its session was
    /// released without being installed.
    Superseded {
        generation: u64,
        selection: ModelSelection,
    },
}

/// Builds sessions off the frame path and installs them into the slot.
///
/// Every request gets a generation number. A build that completes after a
/// newer request has been issued is discarded rather than installed, so the
/// slot always ends up holding the most recently requested selection.
pub struct SessionSwapCoordinator {
    inner: Arc<CoordinatorInner>,
    runtime: Handle,
}

struct CoordinatorInner {
    store: Arc<dyn ModelAssetStore>,
    engine: Arc<dyn InferenceEngine>,
    slot: Arc<AnalyzerSlot>,
    tracker: Arc<LatencyTracker>,
    options: AnalyzerOptions,
    on_result: ResultCallback,
    latest: AtomicU64,
    closed: AtomicBool,
    /// Serialises the final generation check with the install.
    install_lock: Mutex<()>,
}

/// Collaborators a coordinator needs.
pub struct CoordinatorParts {
    pub store: Arc<dyn ModelAssetStore>,
    pub engine: Arc<dyn InferenceEngine>,
    pub slot: Arc<AnalyzerSlot>,
    pub tracker: Arc<LatencyTracker>,
    pub options: AnalyzerOptions,
    pub on_result: ResultCallback,
}

impl SessionSwapCoordinator {
    /// Create a coordinator that runs builds on `runtime`'s blocking pool.
    pub fn new(parts: CoordinatorParts, runtime: Handle) -> Self {
        let CoordinatorParts {
            store,
            engine,
            slot,
            tracker,
            options,
            on_result,
        } = parts;
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                engine,
                slot,
                tracker,
                options,
                on_result,
                latest: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                install_lock: Mutex::new(()),
            }),
            runtime,
        }
    }

    /// Start one full switch cycle for `selection`.
    ///
    /// Latency stats are reset before this returns; asset lookup and session
    /// construction run on a blocking worker. The returned handle resolves to
    /// the outcome, or to the error that abandoned the switch. The previously
    /// installed analyzer stays active on failure.
    pub fn request_switch(&self, selection: ModelSelection) -> JoinHandle<Result<SwitchOutcome>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return self.runtime.spawn(async { Err(PipelineError::ShutDown) });
        }

        let generation = self.inner.latest.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.tracker.begin_switch(generation);
        info!("switch requested to {selection} (generation {generation})");

        let inner = Arc::clone(&self.inner);
        self.runtime
            .spawn_blocking(move || inner.build_and_install(generation, selection))
    }

    /// Generation of the most recent request.
    pub fn latest_generation(&self) -> u64 {
        self.inner.latest.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Refuse further requests, abandon builds in progress and release the
    /// installed session. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let previous = {
            let _guard = self.inner.install_lock.lock();
            self.inner.tracker.deactivate();
            self.inner.slot.clear()
        };
        if let Some(analyzer) = previous {
            info!(
                "shutting down, releasing {} (generation {})",
                analyzer.selection(),
                analyzer.generation()
            );
        }
    }
}

impl CoordinatorInner {
    fn is_current(&self, generation: u64) -> bool {
        !self.closed.load(Ordering::Acquire) && self.latest.load(Ordering::Acquire) == generation
    }

    fn build_and_install(&self, generation: u64, selection: ModelSelection) -> Result<SwitchOutcome> {
        if !self.is_current(generation) {
            debug!("skipping build for {selection}, generation {generation} already superseded");
            return Ok(SwitchOutcome::Superseded {
                generation,
                selection,
            });
        }

        let analyzer = match self.build(generation, selection) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                warn!("Abandoning switch to {selection} (generation {generation}): {e}");
                self.resume_installed(generation);
                return Err(e);
            }
        };

        let previous = {
            let _guard = self.install_lock.lock();
            if !self.is_current(generation) {
                info!(
                    "discarding stale session for {selection} (generation {generation}, latest {})",
                    self.latest.load(Ordering::Acquire)
                );
                return Ok(SwitchOutcome::Superseded {
                    generation,
                    selection,
                });
            }
            self.tracker.activate(generation);
            self.slot.install(analyzer)
        };
        drop(previous);

        Ok(SwitchOutcome::Installed {
            generation,
            selection,
        })
    }

    /// After a failed build, count the analyzer that stayed installed again,
    /// unless a newer request has taken over the stats window.
    fn resume_installed(&self, generation: u64) {
        let _guard = self.install_lock.lock();
        if !self.is_current(generation) {
            return;
        }
        if let Some(installed) = self.slot.installed_generation() {
            self.tracker.resume(installed);
        }
    }

    fn build(&self, generation: u64, selection: ModelSelection) -> Result<Arc<Analyzer>> {
        let bytes = self.store.resolve(&selection)?;
        debug!("resolved {selection} to {} bytes", bytes.len());
        let session = self.engine.build_session(&bytes)?;
        Ok(Arc::new(Analyzer::new(
            generation,
            selection,
            session,
            self.options.clone(),
            Arc::clone(&self.on_result),
        )))
    }
}

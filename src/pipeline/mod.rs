// Frame-processing pipeline: analyzer slot, session swaps and result delivery.

pub mod analyzer;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod report;
pub mod slot;
pub mod worker;

use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::capture::frame::FrameMailbox;
use crate::capture::preprocess::{FramePreprocessor, ResizeNormalize};
use crate::capture::source::FrameSource;
use crate::config::types::PipelineConfig;
use crate::diagnostics::stats::{LatencyTracker, StatsSnapshot};
use crate::engine::backend::InferenceEngine;
use crate::model::assets::ModelAssetStore;
use crate::model::types::ModelSelection;

use analyzer::{AnalyzerOptions, ResultCallback};
use clock::{Clock, MonotonicClock};
use coordinator::{CoordinatorParts, SessionSwapCoordinator, SwitchOutcome};
use error::{PipelineError, Result};
use report::{FrameReport, ReportPublisher, ReportReceiver, ResultSink};
use slot::AnalyzerSlot;
use worker::InferenceWorker;

/// Configures and starts a [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    store: Arc<dyn ModelAssetStore>,
    engine: Arc<dyn InferenceEngine>,
    clock: Arc<dyn Clock>,
    preprocessor: Option<Arc<dyn FramePreprocessor>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for inference latency.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default resize-and-normalise preprocessing.
    pub fn preprocessor(mut self, preprocessor: Arc<dyn FramePreprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Start the camera, then the inference worker.
    ///
    /// If the camera refuses access the error is returned and nothing is
    /// left running. No analyzer is installed until the first
    /// [`Pipeline::select`].
    pub fn start(self, mut source: Box<dyn FrameSource>, runtime: Handle) -> Result<Pipeline> {
        self.config.validate().map_err(PipelineError::Config)?;

        let mailbox = Arc::new(FrameMailbox::new());
        if let Err(e) = source.start(Arc::clone(&mailbox)) {
            tracing::error!("camera failed to start, pipeline not started: {e}");
            return Err(e);
        }

        let slot = Arc::new(AnalyzerSlot::new());
        let tracker = Arc::new(LatencyTracker::new());
        let publisher = Arc::new(ReportPublisher::new());

        let preprocessor = self.preprocessor.unwrap_or_else(|| {
            Arc::new(ResizeNormalize::new(
                self.config.input_width,
                self.config.input_height,
            ))
        });
        let options = AnalyzerOptions {
            top_k: self.config.top_k,
            apply_softmax: self.config.apply_softmax,
            preprocessor,
            clock: self.clock,
        };

        let coordinator = SessionSwapCoordinator::new(
            CoordinatorParts {
                store: self.store,
                engine: self.engine,
                slot: Arc::clone(&slot),
                tracker: Arc::clone(&tracker),
                options,
                on_result: report_callback(Arc::clone(&tracker), Arc::downgrade(&publisher)),
            },
            runtime,
        );

        let worker = InferenceWorker::spawn(Arc::clone(&mailbox), Arc::clone(&slot));

        Ok(Pipeline {
            config: self.config,
            coordinator,
            slot,
            tracker,
            mailbox,
            publisher: Some(publisher),
            worker,
            source,
        })
    }
}

/// Result callback installed in every analyzer: record the latency, then
/// hand the report to the consumer. Results from a superseded generation are
/// dropped.
fn report_callback(tracker: Arc<LatencyTracker>, publisher: Weak<ReportPublisher>) -> ResultCallback {
    Arc::new(move |classification| {
        let Some(stats) = tracker.observe(
            classification.generation,
            classification.process_time_ms(),
        ) else {
            tracing::debug!(
                "dropping result from superseded generation {}",
                classification.generation
            );
            return;
        };
        if let Some(publisher) = publisher.upgrade() {
            publisher.publish(FrameReport {
                classification,
                stats,
            });
        }
    })
}

/// A running camera → classifier pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    coordinator: SessionSwapCoordinator,
    slot: Arc<AnalyzerSlot>,
    tracker: Arc<LatencyTracker>,
    mailbox: Arc<FrameMailbox>,
    publisher: Option<Arc<ReportPublisher>>,
    worker: InferenceWorker,
    source: Box<dyn FrameSource>,
}

impl Pipeline {
    pub fn builder(
        store: Arc<dyn ModelAssetStore>,
        engine: Arc<dyn InferenceEngine>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            config: PipelineConfig::default(),
            store,
            engine,
            clock: Arc::new(MonotonicClock::new()),
            preprocessor: None,
        }
    }

    /// Start with default clock and preprocessing, forwarding every report
    /// to `sink` on the current tokio runtime until shutdown.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn ModelAssetStore>,
        engine: Arc<dyn InferenceEngine>,
        source: Box<dyn FrameSource>,
        mut sink: Box<dyn ResultSink>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PipelineError::Config(format!("no tokio runtime available: {e}")))?;
        let pipeline = Self::builder(store, engine)
            .config(config)
            .start(source, runtime.clone())?;
        if let Some(reports) = pipeline.reports() {
            runtime.spawn(async move {
                reports.forward_to(sink.as_mut()).await;
            });
        }
        Ok(pipeline)
    }

    /// Switch to another model variant without interrupting the stream.
    pub fn select(&self, selection: ModelSelection) -> JoinHandle<Result<SwitchOutcome>> {
        self.coordinator.request_switch(selection)
    }

    /// Switch to the configured default selection.
    pub fn select_default(&self) -> JoinHandle<Result<SwitchOutcome>> {
        self.select(self.config.default_selection)
    }

    /// Subscribe to frame reports. The receiver ends after shutdown.
    pub fn reports(&self) -> Option<ReportReceiver> {
        self.publisher.as_ref().map(|p| p.subscribe())
    }

    /// Latency stats for the current selection.
    pub fn stats(&self) -> StatsSnapshot {
        self.tracker.snapshot()
    }

    /// Mailbox the camera delivers into.
    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    pub fn slot(&self) -> &Arc<AnalyzerSlot> {
        &self.slot
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.coordinator.is_shut_down()
    }

    /// Stop the camera and worker, abandon pending switches and release the
    /// installed session. Idempotent.
    pub fn shutdown(&mut self) {
        if self.is_shut_down() {
            return;
        }
        self.source.stop();
        self.worker.stop();
        self.coordinator.shutdown();
        self.publisher = None;
        tracing::info!(
            "pipeline stopped: {} frames processed, {} failed, {} dropped by the mailbox",
            self.slot.processed(),
            self.slot.failed(),
            self.mailbox.dropped()
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use serde::Serialize;
use std::fmt::Write as _;
use tokio::sync::watch;

use crate::diagnostics::stats::StatsSnapshot;
use crate::model::labels::ClassLabels;
use crate::model::types::ModelSelection;

/// Top-K classification of one frame.
///
/// `scores` is non-increasing and `class_indices[i]` is the model output
/// position `scores[i]` came from. Holds between 1 and K entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub scores: Vec<f32>,
    pub class_indices: Vec<usize>,
    /// Wall time of the inference call alone.
    pub process_time_nanos: u64,
    /// Analyzer generation that produced this result.
    pub generation: u64,
    pub selection: ModelSelection,
}

impl Classification {
    pub fn process_time_ms(&self) -> f64 {
        self.process_time_nanos as f64 / 1_000_000.0
    }

    /// Best class and its score.
    pub fn top(&self) -> Option<(usize, f32)> {
        Some((*self.class_indices.first()?, *self.scores.first()?))
    }
}

/// A classification together with the latency stats it updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub classification: Classification,
    pub stats: StatsSnapshot,
}

impl FrameReport {
    /// Render the report as display lines: one `label  NN.NN%` line per
    /// entry, then current/average/minimum latency.
    pub fn describe(&self, labels: &ClassLabels) -> String {
        let mut out = String::new();
        let c = &self.classification;
        let _ = writeln!(out, "[{}]", c.selection);
        for (index, score) in c.class_indices.iter().zip(&c.scores) {
            let label = labels
                .name(*index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class {index}"));
            let _ = writeln!(out, "  {label:<24} {:>6.2}%", score * 100.0);
        }
        let _ = write!(out, "  inference {:.2}ms", c.process_time_ms());
        if let Some(avg) = self.stats.average_ms {
            let _ = write!(out, "  avg {avg:.2}ms");
        }
        if let Some(min) = self.stats.min_ms {
            let _ = write!(out, "  min {min:.2}ms");
        }
        out
    }
}

/// Consumer of frame reports, driven from a single consumer context.
pub trait ResultSink: Send {
    /// Must return promptly; the next report may already be waiting.
    fn on_result(&mut self, report: &FrameReport);
}

/// Writing side of the single-slot report mailbox.
///
/// Publishing never blocks: a report not yet read is replaced by the newer
/// one, matching the latest-only delivery of frames.
pub struct ReportPublisher {
    tx: watch::Sender<Option<FrameReport>>,
}

impl ReportPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, report: FrameReport) {
        self.tx.send_replace(Some(report));
    }

    pub fn subscribe(&self) -> ReportReceiver {
        ReportReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ReportPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Reading side of the report mailbox, owned by the consumer context.
#[derive(Clone)]
pub struct ReportReceiver {
    rx: watch::Receiver<Option<FrameReport>>,
}

impl ReportReceiver {
    /// Wait for the next unseen report. Returns `None` once the publisher is
    /// gone.
    pub async fn next(&mut self) -> Option<FrameReport> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(report) = self.rx.borrow_and_update().clone() {
                return Some(report);
            }
        }
    }

    /// Most recent report, seen or not.
    pub fn latest(&self) -> Option<FrameReport> {
        self.rx.borrow().clone()
    }

    /// Feed every report to `sink` until the publisher is dropped.
    pub async fn forward_to<S: ResultSink + ?Sized>(mut self, sink: &mut S) {
        while let Some(report) = self.next().await {
            sink.on_result(&report);
        }
    }
}

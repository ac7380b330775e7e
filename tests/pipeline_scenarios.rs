use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use live_classifier_lib::model::assets::InMemoryAssetStore;
use live_classifier_lib::pipeline::clock::ManualClock;
use live_classifier_lib::{
    Architecture, ExternalFeed, Frame, InferenceEngine, InputTensor, ModelSelection,
    PipelineConfig, PipelineError, Pipeline, Result, Session, SwitchOutcome, SyntheticCamera,
};
use tokio::runtime::Handle;

/// Holds one `run` call until released.
struct RunGate {
    started: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// Sessions whose `run` advances a shared manual clock by a scripted amount,
/// so every inference has an exact latency.
struct ScriptedEngine {
    clock: Arc<ManualClock>,
    latencies: Arc<Mutex<VecDeque<u64>>>,
    slow_build: Option<(Vec<u8>, Duration)>,
    gate: Arc<Mutex<Option<RunGate>>>,
    live: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            latencies: Arc::new(Mutex::new(VecDeque::new())),
            slow_build: None,
            gate: Arc::new(Mutex::new(None)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block the next `run` on any session. Returns the release sender and
    /// a receiver that fires once the run has started.
    fn hold_next_run(&self) -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
        let (release_tx, release_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(RunGate {
            started: started_tx,
            release: release_rx,
        });
        (release_tx, started_rx)
    }

    fn with_slow_build(mut self, bytes: Vec<u8>, delay: Duration) -> Self {
        self.slow_build = Some((bytes, delay));
        self
    }

    fn script(&self, latencies_ms: &[u64]) {
        self.latencies.lock().unwrap().extend(latencies_ms);
    }
}

struct ScriptedSession {
    clock: Arc<ManualClock>,
    latencies: Arc<Mutex<VecDeque<u64>>>,
    gate: Arc<Mutex<Option<RunGate>>>,
    live: Arc<AtomicUsize>,
}

impl Session for ScriptedSession {
    fn run(&mut self, _input: &InputTensor) -> Result<Vec<f32>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.started.send(());
            let _ = gate.release.recv_timeout(Duration::from_secs(5));
        }
        let ms = self.latencies.lock().unwrap().pop_front().unwrap_or(1);
        self.clock.advance_ms(ms);
        Ok(vec![0.1, 0.7, 0.2])
    }

    fn release(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InferenceEngine for ScriptedEngine {
    fn build_session(&self, bytes: &[u8]) -> Result<Box<dyn Session>> {
        if bytes.is_empty() {
            return Err(PipelineError::SessionBuild("empty model".into()));
        }
        if let Some((slow, delay)) = &self.slow_build {
            if slow.as_slice() == bytes {
                std::thread::sleep(*delay);
            }
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            clock: Arc::clone(&self.clock),
            latencies: Arc::clone(&self.latencies),
            gate: Arc::clone(&self.gate),
            live: Arc::clone(&self.live),
        }))
    }
}

fn full_store() -> InMemoryAssetStore {
    let mut store = InMemoryAssetStore::new();
    for architecture in Architecture::ALL {
        for quantized in [false, true] {
            let selection = ModelSelection::new(architecture, quantized);
            store.insert(selection, selection.asset_key().into_bytes());
        }
    }
    store
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        input_width: 2,
        input_height: 2,
        ..PipelineConfig::default()
    }
}

fn frame(index: u64) -> Frame {
    Frame {
        data: vec![(index % 256) as u8; 12],
        width: 2,
        height: 2,
        timestamp_us: index,
    }
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Push one frame and wait until the worker has handled it.
async fn feed_one(pipeline: &Pipeline, index: u64) {
    let before = pipeline.slot().processed() + pipeline.slot().failed();
    pipeline.mailbox().push(frame(index));
    wait_for(|| pipeline.slot().processed() + pipeline.slot().failed() > before).await;
}

fn start(engine: Arc<ScriptedEngine>, store: InMemoryAssetStore, clock: Arc<ManualClock>) -> Pipeline {
    Pipeline::builder(Arc::new(store), engine)
        .config(small_config())
        .clock(clock)
        .start(Box::new(ExternalFeed::new()), Handle::current())
        .unwrap()
}

#[tokio::test]
async fn latency_stats_follow_the_active_model() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let mut pipeline = start(Arc::clone(&engine), full_store(), Arc::clone(&clock));
    let reports = pipeline.reports().unwrap();

    let outcome = pipeline
        .select(ModelSelection::new(Architecture::ResNet18, false))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SwitchOutcome::Installed { generation: 1, .. }));

    engine.script(&[10, 20, 5, 15, 10]);
    for i in 0..5 {
        feed_one(&pipeline, i).await;
    }

    let stats = pipeline.stats();
    assert_eq!(stats.count, 5);
    assert_eq!(stats.min_ms, Some(5.0));
    assert_eq!(stats.average_ms, Some(12.0));
    assert_eq!(stats.latest_ms, Some(10.0));

    let report = reports.latest().unwrap();
    assert_eq!(report.classification.class_indices, vec![1, 2, 0]);
    assert_eq!(report.classification.process_time_nanos, 10_000_000);
    assert_eq!(report.stats.count, 5);

    let outcome = pipeline
        .select(ModelSelection::new(Architecture::ResNet18, true))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, SwitchOutcome::Installed { generation: 2, .. }));
    assert_eq!(pipeline.stats().count, 0);
    assert_eq!(engine.live.load(Ordering::SeqCst), 1);

    engine.script(&[7]);
    feed_one(&pipeline, 5).await;
    let stats = pipeline.stats();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.min_ms, Some(7.0));
    assert_eq!(reports.latest().unwrap().classification.generation, 2);

    pipeline.shutdown();
    assert_eq!(engine.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn frame_in_flight_during_swap_stays_out_of_new_stats() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let mut pipeline = start(Arc::clone(&engine), full_store(), clock);
    let reports = pipeline.reports().unwrap();

    pipeline
        .select(ModelSelection::new(Architecture::ResNet18, false))
        .await
        .unwrap()
        .unwrap();

    let (release, started) = engine.hold_next_run();
    engine.script(&[3]);
    pipeline.mailbox().push(frame(0));
    started.recv_timeout(Duration::from_secs(5)).unwrap();

    let switch = pipeline.select(ModelSelection::new(Architecture::ResNet18, true));
    wait_for(|| engine.live.load(Ordering::SeqCst) == 2).await;
    release.send(()).unwrap();

    let outcome = switch.await.unwrap().unwrap();
    assert!(matches!(outcome, SwitchOutcome::Installed { generation: 2, .. }));
    // The old frame ran to completion, but its result was not counted.
    assert_eq!(pipeline.slot().processed(), 1);
    assert_eq!(pipeline.stats().count, 0);
    assert!(reports.latest().is_none());

    engine.script(&[6]);
    feed_one(&pipeline, 1).await;
    let stats = pipeline.stats();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.min_ms, Some(6.0));
    let report = reports.latest().unwrap();
    assert_eq!(report.classification.generation, 2);
    assert_eq!(report.stats.count, 1);

    pipeline.shutdown();
    assert_eq!(engine.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_build_overtaken_by_newer_request_is_discarded() {
    let clock = Arc::new(ManualClock::new());
    let slow = ModelSelection::new(Architecture::ResNet18, false);
    let fast = ModelSelection::new(Architecture::MobileNetV2, false);
    let engine = Arc::new(
        ScriptedEngine::new(Arc::clone(&clock))
            .with_slow_build(slow.asset_key().into_bytes(), Duration::from_millis(300)),
    );
    let mut pipeline = start(Arc::clone(&engine), full_store(), clock);

    let first = pipeline.select(slow);
    let second = pipeline.select(fast);

    let second = second.await.unwrap().unwrap();
    let first = first.await.unwrap().unwrap();
    assert_eq!(
        second,
        SwitchOutcome::Installed {
            generation: 2,
            selection: fast
        }
    );
    assert_eq!(
        first,
        SwitchOutcome::Superseded {
            generation: 1,
            selection: slow
        }
    );

    let current = pipeline.slot().current().unwrap();
    assert_eq!(current.selection(), fast);
    assert_eq!(current.generation(), 2);
    drop(current);
    assert_eq!(engine.live.load(Ordering::SeqCst), 1);

    pipeline.shutdown();
    assert_eq!(engine.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_switch_keeps_previous_model_running() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let broken = ModelSelection::new(Architecture::MobileNetV2, false);
    let store = full_store().with_asset(broken, Vec::new());
    let mut pipeline = start(Arc::clone(&engine), store, clock);

    pipeline
        .select(ModelSelection::default())
        .await
        .unwrap()
        .unwrap();
    let result = pipeline.select(broken).await.unwrap();
    assert!(matches!(result, Err(PipelineError::SessionBuild(_))));
    assert_eq!(pipeline.slot().installed_generation(), Some(1));

    engine.script(&[4]);
    feed_one(&pipeline, 0).await;
    let stats = pipeline.stats();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.latest_ms, Some(4.0));
    let report = pipeline.reports().unwrap().latest().unwrap();
    assert_eq!(report.classification.generation, 1);

    pipeline.shutdown();
}

#[tokio::test]
async fn missing_variant_falls_back_to_default_architecture() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let fallback = ModelSelection::new(Architecture::ResNet18, true);
    let store = InMemoryAssetStore::new().with_asset(fallback, fallback.asset_key().into_bytes());
    let mut pipeline = start(engine, store, clock);

    let requested = ModelSelection::new(Architecture::ShuffleNetV2X05, true);
    let outcome = pipeline.select(requested).await.unwrap().unwrap();
    assert!(matches!(outcome, SwitchOutcome::Installed { generation: 1, .. }));

    let missing = pipeline
        .select(ModelSelection::new(Architecture::MobileNetV2, false))
        .await
        .unwrap();
    assert!(matches!(missing, Err(PipelineError::AssetNotFound(_))));
    assert_eq!(pipeline.slot().installed_generation(), Some(1));

    pipeline.shutdown();
}

#[tokio::test]
async fn frames_before_first_selection_are_ignored() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let mut pipeline = start(engine, full_store(), clock);
    let reports = pipeline.reports().unwrap();

    pipeline.mailbox().push(frame(0));
    wait_for(|| pipeline.mailbox().latest().is_none()).await;

    assert_eq!(pipeline.slot().processed(), 0);
    assert_eq!(pipeline.slot().failed(), 0);
    assert_eq!(pipeline.stats().count, 0);
    assert!(reports.latest().is_none());

    pipeline.shutdown();
}

#[tokio::test]
async fn denied_camera_permission_aborts_start() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let result = Pipeline::builder(Arc::new(full_store()), engine)
        .config(small_config())
        .start(
            Box::new(SyntheticCamera::new(4, 4, 30.0).deny_permission()),
            Handle::current(),
        );
    assert!(matches!(result, Err(PipelineError::PermissionDenied(_))));
}

#[tokio::test]
async fn shutdown_refuses_further_switches() {
    let clock = Arc::new(ManualClock::new());
    let engine = Arc::new(ScriptedEngine::new(Arc::clone(&clock)));
    let mut pipeline = start(Arc::clone(&engine), full_store(), clock);

    pipeline
        .select(ModelSelection::default())
        .await
        .unwrap()
        .unwrap();
    pipeline.shutdown();
    pipeline.shutdown();

    assert!(pipeline.is_shut_down());
    assert!(pipeline.slot().current().is_none());
    assert_eq!(engine.live.load(Ordering::SeqCst), 0);
    let refused = pipeline.select(ModelSelection::default()).await.unwrap();
    assert!(matches!(refused, Err(PipelineError::ShutDown)));
}

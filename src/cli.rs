// Command-line demo driving the synthetic camera.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::capture::source::{SyntheticCamera, MAX_FPS, MIN_FPS};
use crate::config::store::ConfigStore;
use crate::config::types::PipelineConfig;
use crate::engine::backend::InferenceEngine;
use crate::engine::synthetic::SyntheticEngine;
use crate::model::assets::{DirectoryAssetStore, InMemoryAssetStore, ModelAssetStore};
use crate::model::labels::ClassLabels;
use crate::model::types::{Architecture, ModelSelection};
use crate::pipeline::coordinator::SwitchOutcome;
use crate::pipeline::report::{FrameReport, ResultSink};
use crate::pipeline::Pipeline;

const CAMERA_WIDTH: u32 = 640;
const CAMERA_HEIGHT: u32 = 480;
const FALLBACK_CLASS_COUNT: usize = 10;

/// Command-line arguments of the `live-classifier` binary.
#[derive(Debug, Parser)]
#[command(
    name = "live-classifier",
    about = "Classify a live camera feed and switch models without stopping it"
)]
pub struct CliArgs {
    /// Pipeline config file (camelCase JSON). Missing file means defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Architecture to start with (e.g. `resnet18`, `MV2`). Unknown names
    /// fall back to resnet18.
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,
    /// Start with the int8 quantized variant.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub quantized: bool,
    /// Directory holding `<architecture>_<precision>.ort` files.
    #[arg(long = "model-dir", value_name = "DIR")]
    pub model_dir: Option<PathBuf>,
    /// Class label file, one label per line.
    #[arg(long, value_name = "PATH")]
    pub labels: Option<PathBuf>,
    /// Frames the camera delivers before the run ends.
    #[arg(long, default_value_t = 120)]
    pub frames: u64,
    /// Camera frame rate, between 0.1 and 1000.
    #[arg(long, default_value_t = 30.0, value_parser = parse_fps)]
    pub fps: f32,
    /// Switch to this model halfway through the run. Append `:int8` or
    /// `:float` to pick the precision.
    #[arg(long = "switch-to", value_name = "NAME[:PRECISION]")]
    pub switch_to: Option<String>,
    /// Write the effective configuration to PATH and exit.
    #[arg(long = "write-config", value_name = "PATH")]
    pub write_config: Option<PathBuf>,
    /// Enable debug logging (session releases, discarded results).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

fn parse_fps(value: &str) -> std::result::Result<f32, String> {
    let fps: f32 = value.parse().map_err(|e| format!("{e}"))?;
    if !(MIN_FPS..=MAX_FPS).contains(&fps) {
        return Err(format!("must be between {MIN_FPS} and {MAX_FPS}"));
    }
    Ok(fps)
}

/// Parse `name[:int8|:float]`. Without a suffix the given precision is kept.
pub fn parse_selection(value: &str, quantized: bool) -> ModelSelection {
    let (name, quantized) = match value.rsplit_once(':') {
        Some((name, "int8")) => (name, true),
        Some((name, "float")) => (name, false),
        _ => (value, quantized),
    };
    ModelSelection::new(Architecture::parse_or_default(name), quantized)
}

/// Load the config file, then apply command-line overrides.
pub fn resolve_config(args: &CliArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigStore::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(name) = &args.model {
        config.default_selection.architecture = Architecture::parse_or_default(name);
    }
    if args.quantized {
        config.default_selection.quantized = true;
    }
    if let Some(dir) = &args.model_dir {
        config.model_dir = Some(dir.clone());
    }
    if let Some(path) = &args.labels {
        config.labels_path = Some(path.clone());
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

fn load_labels(config: &PipelineConfig) -> Result<ClassLabels> {
    match &config.labels_path {
        Some(path) => Ok(ClassLabels::load(path)?),
        None => Ok(ClassLabels::new(
            (0..FALLBACK_CLASS_COUNT)
                .map(|i| format!("class {i}"))
                .collect(),
        )),
    }
}

/// Model files from the configured directory, or placeholder blobs for
/// every variant when none is configured.
fn create_store(config: &PipelineConfig) -> Arc<dyn ModelAssetStore> {
    if let Some(dir) = &config.model_dir {
        return Arc::new(DirectoryAssetStore::new(dir));
    }
    let mut store = InMemoryAssetStore::new();
    for architecture in Architecture::ALL {
        for quantized in [false, true] {
            let selection = ModelSelection::new(architecture, quantized);
            store.insert(selection, selection.asset_key().into_bytes());
        }
    }
    Arc::new(store)
}

/// Which inference engine scores the model files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Synthetic,
    Onnx,
}

/// Real model files go to ONNX Runtime unless `SYNTHETIC_ENGINE` forces the
/// synthetic engine. The placeholder demo store always uses the synthetic one.
pub fn engine_kind(config: &PipelineConfig, synthetic_forced: bool) -> EngineKind {
    if synthetic_forced || config.model_dir.is_none() {
        EngineKind::Synthetic
    } else {
        EngineKind::Onnx
    }
}

fn create_engine(kind: EngineKind, class_count: usize) -> Result<Arc<dyn InferenceEngine>> {
    match kind {
        EngineKind::Synthetic => {
            info!("using synthetic inference engine");
            Ok(Arc::new(SyntheticEngine::new(class_count.max(1))))
        }
        #[cfg(feature = "ort")]
        EngineKind::Onnx => {
            info!("using ONNX Runtime inference engine");
            Ok(Arc::new(crate::engine::onnx::OnnxEngine::new()))
        }
        #[cfg(not(feature = "ort"))]
        EngineKind::Onnx => anyhow::bail!(
            "model files need ONNX Runtime: rebuild with `--features ort` or set SYNTHETIC_ENGINE=1"
        ),
    }
}

/// Prints every report to stdout.
pub struct ConsoleSink {
    labels: ClassLabels,
}

impl ConsoleSink {
    pub fn new(labels: ClassLabels) -> Self {
        Self { labels }
    }
}

impl ResultSink for ConsoleSink {
    fn on_result(&mut self, report: &FrameReport) {
        println!("{}", report.describe(&self.labels));
    }
}

fn log_outcome(outcome: &SwitchOutcome) {
    match outcome {
        SwitchOutcome::Installed {
            generation,
            selection,
        } => info!("running {selection} (generation {generation})"),
        SwitchOutcome::Superseded {
            generation,
            selection,
        } => info!("{selection} (generation {generation}) was superseded"),
    }
}

/// Run the demo: start the camera, install the configured model, optionally
/// switch halfway, then shut down after the frame budget.
pub async fn run(args: CliArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    if let Some(path) = &args.write_config {
        ConfigStore::save(path, &config)?;
        info!("configuration written to {}", path.display());
        return Ok(());
    }

    let labels = load_labels(&config)?;
    let store = create_store(&config);
    let engine = create_engine(
        engine_kind(&config, SyntheticEngine::is_enabled()),
        labels.len(),
    )?;
    let camera = SyntheticCamera::new(CAMERA_WIDTH, CAMERA_HEIGHT, args.fps)
        .with_frame_limit(args.frames);

    let mut pipeline = Pipeline::start(
        config,
        store,
        engine,
        Box::new(camera),
        Box::new(ConsoleSink::new(labels)),
    )?;

    let outcome = pipeline
        .select_default()
        .await
        .context("model switch task failed")??;
    log_outcome(&outcome);

    let run_time = Duration::try_from_secs_f32(args.frames as f32 / args.fps)
        .context("run time out of range for --frames and --fps")?;
    match &args.switch_to {
        Some(target) => {
            tokio::time::sleep(run_time / 2).await;
            let current = pipeline.config().default_selection;
            let selection = parse_selection(target, current.quantized);
            match pipeline.select(selection).await.context("model switch task failed")? {
                Ok(outcome) => log_outcome(&outcome),
                Err(e) => warn!("switch to {selection} failed, keeping {current}: {e}"),
            }
            tokio::time::sleep(run_time / 2).await;
        }
        None => tokio::time::sleep(run_time).await,
    }

    let stats = pipeline.stats();
    pipeline.shutdown();
    info!(
        "final stats: {} frames, avg {:.2}ms, min {:.2}ms",
        stats.count,
        stats.average_ms.unwrap_or_default(),
        stats.min_ms.unwrap_or_default()
    );
    Ok(())
}

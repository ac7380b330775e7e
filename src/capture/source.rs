use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::info;

use crate::capture::frame::{Frame, FrameMailbox};
use crate::pipeline::error::{PipelineError, Result};

/// Frame rates the synthetic camera can run at.
pub const MIN_FPS: f32 = 0.1;
pub const MAX_FPS: f32 = 1000.0;

/// Push-based camera feed.
///
/// A source delivers frames into the mailbox from its own thread; the
/// mailbox keeps only the latest undelivered frame.
pub trait FrameSource: Send {
    /// Begin delivering frames. Fails with `PermissionDenied` when camera
    /// access is refused, in which case nothing is started.
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()>;

    /// Stop delivering frames. Idempotent.
    fn stop(&mut self);
}

/// Source for frames delivered by the caller through the pipeline's mailbox,
/// e.g. from an existing capture loop.
#[derive(Debug, Default)]
pub struct ExternalFeed {
    started: bool,
}

impl ExternalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl FrameSource for ExternalFeed {
    fn start(&mut self, _mailbox: Arc<FrameMailbox>) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }
}

/// A fake camera for running without real hardware.
///
/// Produces RGB gradient frames that shift with every capture, at a fixed
/// rate, optionally stopping after a frame limit.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    fps: f32,
    frame_limit: Option<u64>,
    permission_granted: bool,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    /// `fps` is clamped to `MIN_FPS..=MAX_FPS`.
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        let fps = if fps.is_nan() {
            MIN_FPS
        } else {
            fps.clamp(MIN_FPS, MAX_FPS)
        };
        Self {
            width,
            height,
            fps,
            frame_limit: None,
            permission_granted: true,
            running: Arc::new(AtomicBool::new(false)),
            delivered: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// Stop on its own after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Simulate the operator refusing camera access.
    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Frames pushed into the mailbox so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Time between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps)
    }

    /// Gradient test pattern offset by the frame number.
    pub fn test_pattern(width: u32, height: u32, index: u64) -> Vec<u8> {
        let shift = (index % 256) as u32;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(128);
            }
        }
        data
    }
}

impl FrameSource for SyntheticCamera {
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> Result<()> {
        if !self.permission_granted {
            return Err(PipelineError::PermissionDenied(
                "camera access was not granted".into(),
            ));
        }
        if self.thread.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let delivered = Arc::clone(&self.delivered);
        let (width, height, limit) = (self.width, self.height, self.frame_limit);
        let interval = self.frame_interval();

        let handle = std::thread::Builder::new()
            .name("camera-synthetic".to_string())
            .spawn(move || {
                info!("synthetic camera started ({width}x{height})");
                let start = Instant::now();
                let mut index = 0u64;
                while running.load(Ordering::Relaxed) {
                    if limit.is_some_and(|l| index >= l) {
                        break;
                    }
                    mailbox.push(Frame {
                        data: Self::test_pattern(width, height, index),
                        width,
                        height,
                        timestamp_us: start.elapsed().as_micros() as u64,
                    });
                    delivered.fetch_add(1, Ordering::Relaxed);
                    index += 1;
                    std::thread::sleep(interval);
                }
                running.store(false, Ordering::Relaxed);
                info!("synthetic camera exiting after {index} frames");
            })
            .expect("failed to spawn synthetic camera thread");
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

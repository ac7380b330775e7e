use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

use crate::capture::frame::FrameMailbox;
use crate::pipeline::slot::AnalyzerSlot;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The single thread that runs inference.
///
/// Takes the latest frame from the mailbox and offers it to the slot, one
/// frame at a time, in capture order.
pub struct InferenceWorker {
    mailbox: Arc<FrameMailbox>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    /// Spawn the worker thread.
    pub fn spawn(mailbox: Arc<FrameMailbox>, slot: Arc<AnalyzerSlot>) -> Self {
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let mailbox = Arc::clone(&mailbox);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("inference-worker".to_string())
                .spawn(move || {
                    info!("inference worker starting");
                    while running.load(Ordering::Relaxed) {
                        if let Some(frame) = mailbox.take(POLL_INTERVAL) {
                            slot.process(&frame);
                        } else if mailbox.is_closed() {
                            break;
                        }
                    }
                    info!(
                        "inference worker exiting after {} frames ({} failed)",
                        slot.processed(),
                        slot.failed()
                    );
                })
                .expect("failed to spawn inference worker thread")
        };

        Self {
            mailbox,
            running,
            thread: Some(thread),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker after the frame in flight. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.mailbox.close();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A single captured frame from the camera.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data (RGB).
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Capture timestamp in microseconds.
    pub timestamp_us: u64,
}

impl Frame {
    /// Byte length an RGB buffer of this frame's dimensions must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

struct MailboxState {
    pending: Option<Arc<Frame>>,
    closed: bool,
}

/// Latest-only hand-off between the camera and the inference worker.
///
/// Holds at most one undelivered frame. Pushing while a frame is still
/// pending replaces it and counts the replaced frame as dropped, so the
/// consumer always sees the most recent capture and nothing queues up.
pub struct FrameMailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
    /// Monotonic counter incremented on each accepted push.
    sequence: AtomicU64,
    dropped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
            sequence: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a frame, replacing any frame not yet taken. Ignored once closed.
    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.pending.replace(Arc::new(frame)).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.sequence.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.ready.notify_one();
    }

    /// Take the pending frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when the mailbox is closed and empty.
    pub fn take(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let mut state = self.state.lock();
        if let Some(frame) = state.pending.take() {
            return Some(frame);
        }
        if state.closed {
            return None;
        }
        self.ready.wait_for(&mut state, timeout);
        state.pending.take()
    }

    /// Peek at the pending frame without taking it.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.state.lock().pending.clone()
    }

    /// Refuse further frames and wake any waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of frames accepted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Number of frames replaced before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameMailbox {
    fn default() -> Self {
        Self::new()
    }
}

//! Timer abstraction for poll delays.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Schedules the pause between two poll attempts.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Wall-clock timer backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Timer that records every requested delay and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingTimer {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.delays
            .lock()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
        // Still a suspension point, so cancellation can interleave.
        tokio::task::yield_now().await;
    }
}

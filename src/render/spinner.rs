//! Yet another braille spinner; just enough to get the job done.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const PHASES: [&str; 6] = ["⠉", "⠘", "⠰", "⠤", "⠆", "⠃"];

/// A spinner stepping through its phases on a background tick task.
pub struct Spinner {
    phase: Arc<AtomicUsize>,
    ticker: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(AtomicUsize::new(0)),
            ticker: None,
        }
    }

    /// Starts stepping every `interval`.
    pub fn start(&mut self, interval: Duration) {
        let phase = Arc::clone(&self.phase);
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                phase.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    /// The glyph for the current phase.
    pub fn glyph(&self) -> &'static str {
        PHASES[self.phase.load(Ordering::Relaxed) % PHASES.len()]
    }

    /// Steps to the next phase by hand; the ticker normally does this.
    pub fn advance(&self) {
        self.phase.fetch_add(1, Ordering::Relaxed);
    }

    /// Stops the background ticker.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

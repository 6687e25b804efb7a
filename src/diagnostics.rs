//! In-memory diagnostics ring buffer and tracing setup.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Entries kept in the ring buffer.
const MAX_LOG_LINES: usize = 120;

/// Bounded log of recent sync activity, kept for support and debugging.
///
/// Background failures are silent to the user apart from the sticky status
/// flags; this buffer is where they remain visible.
#[derive(Default)]
pub struct DiagnosticsLog {
    lines: Mutex<VecDeque<String>>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(target: "sweatpact::diagnostics", "{line}");
        let mut lines = self.lines.lock().unwrap();
        lines.push_back(line);
        while lines.len() > MAX_LOG_LINES {
            lines.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().cloned().collect()
    }
}

/// Initialize structured logging for host apps and tests.
///
/// Respects `RUST_LOG`; safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

//! Cheap live estimate of how many chunks a text will produce.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::split::split_text;

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Window during which small appends reuse the previous estimate.
pub const REUSE_WINDOW: Duration = Duration::from_millis(200);

/// Appends smaller than this fraction of the chunk size count as small edits.
pub const SMALL_EDIT_RATIO: f64 = 0.05;

/// Estimates chunk counts while the user is typing.
///
/// Running the splitter on every keystroke is wasteful for large inputs, so
/// a text that only appended a little to the previous one shortly after
/// the last full estimate gets the cached count.
pub struct ChunkEstimator {
    chunk_size_chars: usize,
    overlap_chars: usize,
    clock: Arc<dyn Clock>,
    last_text: String,
    last_estimate: usize,
    last_full_run: Option<Instant>,
    full_runs: u64,
}

impl ChunkEstimator {
    pub fn new(chunk_size_chars: usize, overlap_chars: usize) -> Self {
        Self::with_clock(chunk_size_chars, overlap_chars, Arc::new(SystemClock))
    }

    pub fn with_clock(chunk_size_chars: usize, overlap_chars: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            chunk_size_chars,
            overlap_chars,
            clock,
            last_text: String::new(),
            last_estimate: 0,
            last_full_run: None,
            full_runs: 0,
        }
    }

    /// Estimated number of chunks for `text`.
    pub fn estimate(&mut self, text: &str) -> usize {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0;
        }

        let len = trimmed.chars().count();
        if len <= self.chunk_size_chars {
            self.last_text = trimmed.to_string();
            self.last_estimate = 1;
            return 1;
        }

        let now = self.clock.now();
        if self.is_small_edit(trimmed, len, now) {
            return self.last_estimate;
        }

        let count = split_text(trimmed, self.chunk_size_chars, self.overlap_chars).len();
        self.last_text = trimmed.to_string();
        self.last_estimate = count;
        self.last_full_run = Some(now);
        self.full_runs += 1;
        count
    }

    /// Number of times the splitter actually ran.
    pub fn full_runs(&self) -> u64 {
        self.full_runs
    }

    fn is_small_edit(&self, trimmed: &str, len: usize, now: Instant) -> bool {
        if self.last_estimate == 0 || !trimmed.starts_with(self.last_text.as_str()) {
            return false;
        }
        let Some(last_run) = self.last_full_run else {
            return false;
        };
        let growth = len - self.last_text.chars().count();
        let small = (growth as f64) < self.chunk_size_chars as f64 * SMALL_EDIT_RATIO;
        small && now.saturating_duration_since(last_run) < REUSE_WINDOW
    }
}

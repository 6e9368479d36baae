use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Sample;

/// Selects which part of a buffer a reader wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowSpec {
    /// The most recent `n` samples.
    Latest(usize),
    /// Samples no older than `duration` before the newest sample.
    Trailing(Duration),
}

/// Index of the first sample inside the trailing window ending at the newest sample.
#[must_use]
pub fn trailing_window_start(samples: &VecDeque<Sample>, span: Duration) -> usize {
    let Some(newest) = samples.back() else {
        return 0;
    };
    let cutoff = newest.timestamp() - span.as_secs_f64();
    samples.partition_point(|sample| sample.timestamp() < cutoff)
}

/// Index of the first of the `count` most recent samples.
#[must_use]
pub fn latest_window_start(len: usize, count: usize) -> usize {
    len.saturating_sub(count)
}

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::core::Sample;
use crate::error::{FeedError, FeedResult};

/// Reduces an ordered window to exactly `target_count` samples.
///
/// Windows that already fit are returned unchanged. Otherwise the first and
/// last samples are always kept, the time span is cut into equal-width
/// buckets whose minimum and maximum survive, and remaining slots go to the
/// global extrema and then to the widest gaps between kept samples.
pub fn decimate(window: &[Sample], target_count: usize) -> FeedResult<Vec<Sample>> {
    let indices = decimate_indices(window, target_count)?;
    Ok(indices.into_iter().map(|idx| window[idx].clone()).collect())
}

/// Same selection as [`decimate`], expressed as ascending window indices.
pub fn decimate_indices(window: &[Sample], target_count: usize) -> FeedResult<Vec<usize>> {
    if target_count == 0 {
        return Err(FeedError::Decimation(
            "target point count must be > 0".to_owned(),
        ));
    }

    let len = window.len();
    if len <= target_count {
        return Ok((0..len).collect());
    }
    let last = len - 1;
    if target_count == 1 {
        // Both endpoints cannot fit; the newest reading wins.
        return Ok(vec![last]);
    }

    let mut selection = Selection::new(len);
    selection.pick(0);
    selection.pick(last);

    let bucket_count = (target_count - 2) / 2;
    if bucket_count > 0 {
        for (min_idx, max_idx) in bucket_extremes(window, bucket_count) {
            selection.pick(min_idx);
            selection.pick(max_idx);
        }
    }

    if let Some((min_idx, max_idx)) = global_extrema(window) {
        for idx in [min_idx, max_idx] {
            if selection.count >= target_count {
                break;
            }
            selection.pick(idx);
        }
    }

    let missing = target_count.saturating_sub(selection.count);
    if missing > 0 {
        fill_widest_gaps(&mut selection, missing);
    }

    Ok(selection.into_indices())
}

struct Selection {
    picked: Vec<bool>,
    count: usize,
}

impl Selection {
    fn new(len: usize) -> Self {
        Self {
            picked: vec![false; len],
            count: 0,
        }
    }

    fn pick(&mut self, idx: usize) {
        if !self.picked[idx] {
            self.picked[idx] = true;
            self.count += 1;
        }
    }

    fn into_indices(self) -> Vec<usize> {
        self.picked
            .iter()
            .enumerate()
            .filter_map(|(idx, picked)| picked.then_some(idx))
            .collect()
    }
}

fn bucket_of(sample: &Sample, idx: usize, len: usize, first: f64, span: f64, buckets: usize) -> usize {
    let raw = if span > 0.0 {
        ((sample.timestamp() - first) / span * buckets as f64) as usize
    } else {
        // All timestamps equal: fall back to equal-count buckets.
        idx * buckets / len
    };
    raw.min(buckets - 1)
}

fn bucket_extremes(window: &[Sample], bucket_count: usize) -> Vec<(usize, usize)> {
    let len = window.len();
    let first = window[0].timestamp();
    let span = window[len - 1].timestamp() - first;
    let mut extremes: Vec<Option<(usize, usize)>> = vec![None; bucket_count];

    for (idx, sample) in window.iter().enumerate() {
        let bucket = bucket_of(sample, idx, len, first, span, bucket_count);
        let value = OrderedFloat(sample.value());
        let (min_idx, max_idx) = extremes[bucket].get_or_insert((idx, idx));
        if value < OrderedFloat(window[*min_idx].value()) {
            *min_idx = idx;
        }
        if value > OrderedFloat(window[*max_idx].value()) {
            *max_idx = idx;
        }
    }

    extremes.into_iter().flatten().collect()
}

fn global_extrema(window: &[Sample]) -> Option<(usize, usize)> {
    let min_idx = window
        .iter()
        .enumerate()
        .min_by_key(|(_, sample)| OrderedFloat(sample.value()))
        .map(|(idx, _)| idx)?;
    let max_idx = window
        .iter()
        .enumerate()
        .max_by_key(|(_, sample)| OrderedFloat(sample.value()))
        .map(|(idx, _)| idx)?;
    Some((min_idx, max_idx))
}

/// Picks the midpoint of the widest run of unpicked indices, `remaining` times.
fn fill_widest_gaps(selection: &mut Selection, mut remaining: usize) {
    let kept: Vec<usize> = selection
        .picked
        .iter()
        .enumerate()
        .filter_map(|(idx, picked)| picked.then_some(idx))
        .collect();

    // (unpicked count, leftmost first, right bound)
    let mut gaps: BinaryHeap<(usize, Reverse<usize>, usize)> = kept
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > 1)
        .map(|pair| (pair[1] - pair[0] - 1, Reverse(pair[0]), pair[1]))
        .collect();

    while remaining > 0 {
        let Some((_, Reverse(left), right)) = gaps.pop() else {
            break;
        };
        let mid = left + (right - left) / 2;
        selection.pick(mid);
        remaining -= 1;
        if mid - left > 1 {
            gaps.push((mid - left - 1, Reverse(left), mid));
        }
        if right - mid > 1 {
            gaps.push((right - mid - 1, Reverse(mid), right));
        }
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::Sample;
use crate::core::primitives::datetime_to_unix_seconds;
use crate::error::{FeedError, FeedResult};
use crate::source::codec::{decode_value, record_timestamp};
use crate::source::{SourceAdapter, SourceHandle, TransportKind};

const BURST_LIMIT: usize = 256;
/// Longest pause honoured between two recorded records.
const MAX_RECORD_GAP: Duration = Duration::from_secs(3_600);

/// One line of a recording; unparseable lines are kept so they surface as
/// parse errors in playback order.
type ReplayRecord = FeedResult<Value>;

/// Plays a recorded telemetry file back as if it were live.
///
/// Accepts NDJSON (one record per line) or a single JSON array. With
/// realtime pacing, the gap between records follows their timestamps divided
/// by `speed`; records without a timestamp are spaced by the default
/// interval and stamped with the wall clock.
pub struct ReplayAdapter {
    id: String,
    path: PathBuf,
    speed: f64,
    realtime: bool,
    loop_playback: bool,
    default_interval: Duration,
    records: Vec<ReplayRecord>,
    cursor: usize,
    connected: bool,
    exhausted: bool,
    next_due: Option<Instant>,
    time_offset: f64,
    loops: u64,
}

impl ReplayAdapter {
    pub fn new(id: &str, path: impl Into<PathBuf>, speed: f64) -> FeedResult<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(FeedError::Configuration(format!(
                "replay speed must be finite and > 0, got {speed}"
            )));
        }
        Ok(Self {
            id: id.to_owned(),
            path: path.into(),
            speed,
            realtime: true,
            loop_playback: false,
            default_interval: Duration::from_millis(500),
            records: Vec::new(),
            cursor: 0,
            connected: false,
            exhausted: false,
            next_due: None,
            time_offset: 0.0,
            loops: 0,
        })
    }

    #[must_use]
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    #[must_use]
    pub fn with_loop(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    #[must_use]
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Completed passes over the file when looping.
    #[must_use]
    pub fn loops_completed(&self) -> u64 {
        self.loops
    }

    fn scaled(&self, interval: Duration) -> Duration {
        Duration::try_from_secs_f64(interval.as_secs_f64() / self.speed)
            .unwrap_or(MAX_RECORD_GAP)
            .min(MAX_RECORD_GAP)
    }

    fn schedule(&mut self, pacing: Duration) {
        let now = Instant::now();
        self.next_due = Some(now.checked_add(pacing).unwrap_or(now));
    }

    /// Applies wrap-around or reports the end of the recording.
    fn wrap_or_finish(&mut self) -> FeedResult<()> {
        if !self.loop_playback {
            self.connected = false;
            self.exhausted = true;
            info!(source = %self.id, path = %self.path.display(), "replay finished");
            return Err(FeedError::connection(&self.id, "end of recording"));
        }
        let (first, last) = recording_bounds(&self.records);
        if let (Some(first), Some(last)) = (first, last) {
            // Next pass starts one default interval after the previous one ended.
            self.time_offset += (last - first) + self.default_interval.as_secs_f64();
        }
        self.cursor = 0;
        self.loops += 1;
        debug!(source = %self.id, loops = self.loops, "replay looped");
        Ok(())
    }

    /// Emits the record under the cursor and schedules the next one.
    fn emit_next(&mut self) -> FeedResult<Vec<Sample>> {
        let index = self.cursor;
        self.cursor += 1;
        let record = match &self.records[index] {
            Ok(record) => record,
            Err(err) => {
                let err = err.clone();
                let pacing = self.pacing_for(None);
                self.schedule(pacing);
                return Err(err);
            }
        };

        let decoded = match record_timestamp(record) {
            Ok(Some(timestamp)) => decode_value(record, None).map(|samples| {
                let shifted: Vec<Sample> = samples
                    .iter()
                    .map(|sample| sample.shifted(self.time_offset))
                    .collect();
                (shifted, Some(timestamp))
            }),
            Ok(None) => {
                decode_value(record, Some(wall_clock_seconds())).map(|samples| (samples, None))
            }
            Err(err) => Err(err),
        };

        match decoded {
            Ok((samples, timestamp)) => {
                let pacing = self.pacing_for(timestamp);
                self.schedule(pacing);
                Ok(samples)
            }
            Err(err) => {
                let pacing = self.pacing_for(None);
                self.schedule(pacing);
                Err(err)
            }
        }
    }

    /// Wait before the record after the one stamped `current`.
    fn pacing_for(&self, current: Option<f64>) -> Duration {
        if !self.realtime {
            return Duration::ZERO;
        }
        let next = self
            .records
            .get(self.cursor)
            .and_then(|record| record.as_ref().ok())
            .and_then(|record| record_timestamp(record).ok().flatten());
        match (current, next) {
            (Some(current), Some(next)) => {
                let gap = Duration::try_from_secs_f64((next - current).max(0.0))
                    .unwrap_or(MAX_RECORD_GAP);
                self.scaled(gap.min(MAX_RECORD_GAP))
            }
            _ => self.scaled(self.default_interval),
        }
    }
}

impl SourceAdapter for ReplayAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Replay
    }

    fn connect(&mut self) -> FeedResult<SourceHandle> {
        if self.exhausted {
            return Err(FeedError::connection(&self.id, "recording already played"));
        }
        if !self.connected {
            let text = fs::read_to_string(&self.path).map_err(|e| {
                FeedError::connection(&self.id, format!("cannot read {}: {e}", self.path.display()))
            })?;
            self.records = load_records(&text);
            if self.records.is_empty() {
                return Err(FeedError::connection(&self.id, "recording is empty"));
            }
            self.cursor = 0;
            self.next_due = None;
            self.connected = true;
            info!(
                source = %self.id,
                path = %self.path.display(),
                records = self.records.len(),
                speed = self.speed,
                realtime = self.realtime,
                "replay opened"
            );
        }
        Ok(SourceHandle {
            source_id: self.id.clone(),
            kind: TransportKind::Replay,
            endpoint: self.path.display().to_string(),
        })
    }

    fn read(&mut self, timeout: Duration) -> FeedResult<Vec<Sample>> {
        if !self.connected {
            return Err(FeedError::connection(&self.id, "replay is not open"));
        }
        if self.cursor >= self.records.len() {
            self.wrap_or_finish()?;
        }

        if !self.realtime {
            let mut burst = Vec::new();
            let mut emitted = 0;
            while emitted < BURST_LIMIT && self.cursor < self.records.len() {
                match self.emit_next() {
                    Ok(samples) => burst.extend(samples),
                    Err(err) if burst.is_empty() => return Err(err),
                    Err(_) => {
                        // Report the bad record on the next call.
                        self.cursor -= 1;
                        break;
                    }
                }
                emitted += 1;
            }
            return Ok(burst);
        }

        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    return Ok(Vec::new());
                }
                thread::sleep(wait);
            }
        }
        self.emit_next()
    }

    fn disconnect(&mut self) {
        if self.connected {
            debug!(source = %self.id, cursor = self.cursor, "replay closed");
        }
        self.connected = false;
        self.records.clear();
        self.cursor = 0;
        self.next_due = None;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn load_records(text: &str) -> Vec<ReplayRecord> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(records)) => records.into_iter().map(Ok).collect(),
            Ok(_) => vec![Err(FeedError::Parse("recording is not an array".to_owned()))],
            Err(e) => vec![Err(FeedError::Parse(format!("invalid JSON recording: {e}")))],
        };
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            serde_json::from_str::<Value>(line)
                .map_err(|e| FeedError::Parse(format!("invalid replay record: {e}")))
        })
        .collect()
}

fn recording_bounds(records: &[ReplayRecord]) -> (Option<f64>, Option<f64>) {
    let mut stamps = records
        .iter()
        .filter_map(|record| record.as_ref().ok())
        .filter_map(|record| record_timestamp(record).ok().flatten());
    let first = stamps.next();
    let last = stamps.last().or(first);
    (first, last)
}

fn wall_clock_seconds() -> f64 {
    datetime_to_unix_seconds(Utc::now())
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::percentiles::{PercentileSet, RunHistogram};
use super::snapshot::{mean_and_std_dev, BandwidthStats, DelayStats, RateStats, StatsSnapshot};
use super::window::SampleWindow;
use super::{MetricKind, Sample, StreamKey};
use crate::clock::{Clock, Timestamp};
use crate::error::SampleError;

// ─── Configuration ───────────────────────────────────────────────

/// Default number of samples retained per stream.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

const NANOS_PER_SEC: f64 = 1e9;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe statistics engine shared by every stream of one run.
///
/// Transport callbacks call `record_arrival()`, the reporter calls
/// `compute()`. A single lock covers all windows: recording is an append
/// plus at most one eviction, and reads happen once per reporting period.
pub struct StatsCollector {
    kind: MetricKind,
    window_size: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    streams: HashMap<StreamKey, StreamState>,
}

struct StreamState {
    window: SampleWindow,
    // Newest timestamp covered by the last successful compute
    last_reported: Option<Timestamp>,
    // Previous arrival, for cumulative inter-arrival intervals
    previous: Option<Timestamp>,
    summary: RunHistogram,
}

impl StreamState {
    fn new(window_size: usize) -> Self {
        Self {
            window: SampleWindow::new(window_size),
            last_reported: None,
            previous: None,
            summary: RunHistogram::new(),
        }
    }
}

// ─── StatsCollector impl ─────────────────────────────────────────

impl StatsCollector {
    pub fn new(kind: MetricKind, window_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            window_size,
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record an arrival observed now.
    ///
    /// `extract` turns the arrival time into the sample value (payload size,
    /// or delay against the message stamp). If it fails the arrival is logged
    /// and discarded; the collector keeps running.
    pub fn record_arrival<F>(&self, stream: &str, extract: F)
    where
        F: FnOnce(Timestamp) -> Result<u64, SampleError>,
    {
        let now = self.clock.now();
        match extract(now) {
            Ok(value) => self.record(stream, Sample::new(now, value)),
            Err(e) => warn!(topic = %stream, error = %e, "discarding sample"),
        }
    }

    /// Append a sample to the stream's window, evicting the oldest on overflow.
    pub fn record(&self, stream: &str, sample: Sample) {
        let mut inner = self.inner.lock();
        let window_size = self.window_size;
        let state = inner
            .streams
            .entry(stream.to_owned())
            .or_insert_with(|| StreamState::new(window_size));

        let summary_value = match self.kind {
            MetricKind::Bandwidth => Some(sample.value),
            MetricKind::Delay => Some(sample.value / 1_000),
            MetricKind::Rate => state
                .previous
                .map(|prev| sample.timestamp.saturating_since(prev).as_micros() as u64),
        };
        if let Some(v) = summary_value {
            state.summary.record(v);
        }
        state.previous = Some(sample.timestamp);

        state.window.push(sample);
    }

    /// Statistics over the stream's current window.
    ///
    /// Returns `None` when fewer than two samples are held, when nothing
    /// arrived since the last successful compute, or when the clock went
    /// backwards (the window is then cleared).
    pub fn compute(&self, stream: &str) -> Option<StatsSnapshot> {
        let mut inner = self.inner.lock();
        let state = inner.streams.get_mut(stream)?;

        if state.window.len() < 2 {
            return None;
        }
        let oldest = state.window.oldest()?.timestamp;
        let newest = state.window.newest()?.timestamp;
        if state.last_reported == Some(newest) {
            return None;
        }

        let now = self.clock.now();
        if now <= oldest {
            warn!(topic = %stream, "time is reset!");
            state.window.clear();
            return None;
        }
        let elapsed_s = (now.as_nanos() - oldest.as_nanos()) as f64 / NANOS_PER_SEC;

        let snapshot = match self.kind {
            MetricKind::Bandwidth => bandwidth(stream, &state.window, elapsed_s),
            MetricKind::Rate => rate(stream, &state.window, elapsed_s),
            MetricKind::Delay => delay(stream, &state.window),
        };

        state.last_reported = Some(newest);
        Some(snapshot)
    }

    /// Compute every listed stream, skipping those without fresh data.
    pub fn compute_all<'a, I>(&self, streams: I) -> Vec<StatsSnapshot>
    where
        I: IntoIterator<Item = &'a StreamKey>,
    {
        streams.into_iter().filter_map(|s| self.compute(s)).collect()
    }

    /// Cumulative percentile sets for every stream that recorded anything.
    pub fn summaries(&self) -> Vec<(StreamKey, PercentileSet)> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .streams
            .iter()
            .filter_map(|(k, s)| Some((k.clone(), s.summary.percentiles()?)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of samples currently held for `stream`.
    pub fn window_len(&self, stream: &str) -> usize {
        self.inner
            .lock()
            .streams
            .get(stream)
            .map_or(0, |s| s.window.len())
    }
}

// ─── Per-metric aggregation ──────────────────────────────────────

fn bandwidth(stream: &str, window: &SampleWindow, elapsed_s: f64) -> StatsSnapshot {
    let n = window.len();
    let total: u64 = window.iter().map(|s| s.value).sum();
    let min = window.iter().map(|s| s.value).min().unwrap_or(0);
    let max = window.iter().map(|s| s.value).max().unwrap_or(0);

    StatsSnapshot::Bandwidth(BandwidthStats {
        topic: stream.to_owned(),
        bytes_per_s: total as f64 / elapsed_s,
        mean: total as f64 / n as f64,
        min,
        max,
        count: n,
    })
}

fn rate(stream: &str, window: &SampleWindow, elapsed_s: f64) -> StatsSnapshot {
    let n = window.len();
    let stamps: Vec<Timestamp> = window.iter().map(|s| s.timestamp).collect();
    let intervals: Vec<f64> = stamps
        .windows(2)
        .map(|w| w[1].saturating_since(w[0]).as_secs_f64())
        .collect();
    let (_, std_dev) = mean_and_std_dev(&intervals);

    StatsSnapshot::Rate(RateStats {
        topic: stream.to_owned(),
        rate_hz: n as f64 / elapsed_s,
        min_interval_s: intervals.iter().copied().fold(f64::INFINITY, f64::min),
        max_interval_s: intervals.iter().copied().fold(0.0, f64::max),
        std_dev_s: std_dev,
        count: n,
    })
}

fn delay(stream: &str, window: &SampleWindow) -> StatsSnapshot {
    let delays: Vec<f64> = window
        .iter()
        .map(|s| s.value as f64 / NANOS_PER_SEC)
        .collect();
    let (mean, std_dev) = mean_and_std_dev(&delays);

    StatsSnapshot::Delay(DelayStats {
        topic: stream.to_owned(),
        mean_delay_s: mean,
        min_delay_s: delays.iter().copied().fold(f64::INFINITY, f64::min),
        max_delay_s: delays.iter().copied().fold(0.0, f64::max),
        std_dev_s: std_dev,
        count: delays.len(),
    })
}

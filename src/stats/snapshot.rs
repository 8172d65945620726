use serde::Serialize;

use super::{MetricKind, StreamKey};

/// Bandwidth over the current window. Sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthStats {
    pub topic: StreamKey,
    pub bytes_per_s: f64,
    pub mean: f64,
    pub min: u64,
    pub max: u64,
    pub count: usize,
}

/// Arrival rate over the current window, with inter-arrival spread in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateStats {
    pub topic: StreamKey,
    pub rate_hz: f64,
    pub min_interval_s: f64,
    pub max_interval_s: f64,
    pub std_dev_s: f64,
    pub count: usize,
}

/// End-to-end delay over the current window, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayStats {
    pub topic: StreamKey,
    pub mean_delay_s: f64,
    pub min_delay_s: f64,
    pub max_delay_s: f64,
    pub std_dev_s: f64,
    pub count: usize,
}

/// Computed, immutable result for one stream at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum StatsSnapshot {
    Bandwidth(BandwidthStats),
    Rate(RateStats),
    Delay(DelayStats),
}

impl StatsSnapshot {
    pub fn topic(&self) -> &str {
        match self {
            Self::Bandwidth(s) => &s.topic,
            Self::Rate(s) => &s.topic,
            Self::Delay(s) => &s.topic,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Bandwidth(s) => s.count,
            Self::Rate(s) => s.count,
            Self::Delay(s) => s.count,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Bandwidth(_) => MetricKind::Bandwidth,
            Self::Rate(_) => MetricKind::Rate,
            Self::Delay(_) => MetricKind::Delay,
        }
    }
}

/// Population mean and standard deviation of `values`.
pub(crate) fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

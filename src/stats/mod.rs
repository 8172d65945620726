pub mod collector;
pub mod percentiles;
pub mod snapshot;
pub mod window;

use serde::Serialize;

use crate::clock::Timestamp;

pub use collector::StatsCollector;
pub use percentiles::PercentileSet;
pub use snapshot::{BandwidthStats, DelayStats, RateStats, StatsSnapshot};
pub use window::SampleWindow;

/// Identifies a monitored stream. Topic names are unique within a graph.
pub type StreamKey = String;

/// A single arrival on a stream.
/// This is the "write" side: transport callbacks create these and push them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// When the arrival was observed
    pub timestamp: Timestamp,
    /// Payload size in bytes, or delay in nanoseconds for delay collectors
    pub value: u64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: u64) -> Self {
        Self { timestamp, value }
    }
}

/// Which statistic a collector derives from its windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Bandwidth,
    Rate,
    Delay,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bandwidth => "bw",
            Self::Rate => "hz",
            Self::Delay => "delay",
        }
    }
}

use hdrhistogram::Histogram;
use serde::Serialize;

/// Cumulative record of every value one stream produced during the run.
///
/// Values are bytes for bandwidth collectors and microseconds for rate
/// (inter-arrival) and delay collectors.
pub(crate) struct RunHistogram {
    hist: Histogram<u64>,
}

impl RunHistogram {
    pub(crate) fn new() -> Self {
        // Three significant figures; auto-resizing so no upper bound is needed.
        let hist = Histogram::<u64>::new(3).expect("3 significant figures is in range");
        Self { hist }
    }

    /// Values below 1 are counted as 1 so empty payloads still show up.
    pub(crate) fn record(&mut self, value: u64) {
        self.hist.saturating_record(value.max(1));
    }

    pub(crate) fn percentiles(&self) -> Option<PercentileSet> {
        let h = &self.hist;
        if h.is_empty() {
            return None;
        }
        Some(PercentileSet {
            count: h.len(),
            min: h.min(),
            p50: h.value_at_quantile(0.50),
            p95: h.value_at_quantile(0.95),
            p99: h.value_at_quantile(0.99),
            max: h.max(),
            mean: h.mean(),
        })
    }
}

/// Percentile breakdown printed by `--summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub mean: f64,
}

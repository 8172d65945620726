//! Text rendering of statistics snapshots.
//!
//! Everything here is a pure function of its input; writing to the terminal
//! (and clearing it between table draws) belongs to the reporter.

use crate::stats::{
    BandwidthStats, DelayStats, MetricKind, PercentileSet, RateStats, StatsSnapshot, StreamKey,
};

/// Space between table columns.
const GUTTER: &str = "   ";

// ─── Byte units ──────────────────────────────────────────────────

/// Decimal byte unit, picked from the bandwidth and applied to every size
/// of the same report so the numbers stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteUnit {
    B,
    KB,
    MB,
}

impl ByteUnit {
    pub fn for_rate(bytes_per_s: f64) -> Self {
        if bytes_per_s < 1_000.0 {
            Self::B
        } else if bytes_per_s < 1_000_000.0 {
            Self::KB
        } else {
            Self::MB
        }
    }

    pub fn format(self, bytes: f64) -> String {
        match self {
            Self::B => format!("{bytes:.0} B"),
            Self::KB => format!("{:.2} KB", bytes / 1_000.0),
            Self::MB => format!("{:.2} MB", bytes / 1_000.0 / 1_000.0),
        }
    }
}

/// Human strings for one bandwidth snapshot: (bw/s, mean, min, max).
fn bandwidth_fields(s: &BandwidthStats) -> (String, String, String, String) {
    let unit = ByteUnit::for_rate(s.bytes_per_s);
    (
        format!("{}/s", unit.format(s.bytes_per_s)),
        unit.format(s.mean),
        unit.format(s.min as f64),
        unit.format(s.max as f64),
    )
}

// ─── Single stream ───────────────────────────────────────────────

fn render_single(snapshot: &StatsSnapshot) -> String {
    match snapshot {
        StatsSnapshot::Bandwidth(s) => {
            let (bw, mean, min, max) = bandwidth_fields(s);
            format!(
                "{bw} from {} messages\n\tMessage size mean: {mean} min: {min} max: {max}\n",
                s.count
            )
        }
        StatsSnapshot::Rate(s) => format!(
            "average rate: {:.3}\n\tmin: {:.3}s max: {:.3}s std dev: {:.5}s window: {}\n",
            s.rate_hz, s.min_interval_s, s.max_interval_s, s.std_dev_s, s.count
        ),
        StatsSnapshot::Delay(s) => format!(
            "average delay: {:.3}\n\tmin: {:.3}s max: {:.3}s std dev: {:.5}s window: {}\n",
            s.mean_delay_s, s.min_delay_s, s.max_delay_s, s.std_dev_s, s.count
        ),
    }
}

// ─── Table ───────────────────────────────────────────────────────

/// Left-aligned text table with a centred header and an `=` rule.
#[derive(Debug, Clone, Default)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows shorter than the header are padded with empty cells.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.header.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        self.header
            .iter()
            .enumerate()
            .map(|(i, h)| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Total rendered width, gutters included.
    pub fn width(&self) -> usize {
        let cols = self.header.len();
        self.widths().iter().sum::<usize>() + GUTTER.len() * cols.saturating_sub(1)
    }

    /// Render the table; an empty table renders to an empty string.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        let widths = self.widths();

        let header = self
            .header
            .iter()
            .zip(&widths)
            .map(|(h, w)| center(h, *w))
            .collect::<Vec<_>>()
            .join(GUTTER);
        let body = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&widths)
                    .map(|(cell, w)| format!("{cell:<w$}"))
                    .collect::<Vec<_>>()
                    .join(GUTTER)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!("{header}\n{}\n{body}\n", "=".repeat(self.width()))
    }
}

/// Centre `s` in `width` columns; odd padding puts the extra space on the
/// left when `width` is odd, on the right otherwise.
fn center(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_owned();
    }
    let marg = width - len;
    let left = marg / 2 + (marg & width & 1);
    format!("{}{s}{}", " ".repeat(left), " ".repeat(marg - left))
}

fn header_for(kind: MetricKind) -> &'static [&'static str] {
    match kind {
        MetricKind::Bandwidth => &["topic", "bandwidth", "window", "mean", "min", "max"],
        MetricKind::Rate => &["topic", "rate", "min_delta", "max_delta", "std_dev", "window"],
        MetricKind::Delay => &["topic", "delay", "min", "max", "std_dev", "window"],
    }
}

fn table_row(snapshot: &StatsSnapshot) -> Vec<String> {
    match snapshot {
        StatsSnapshot::Bandwidth(s) => {
            let (bw, mean, min, max) = bandwidth_fields(s);
            vec![s.topic.clone(), bw, s.count.to_string(), mean, min, max]
        }
        StatsSnapshot::Rate(RateStats {
            topic,
            rate_hz,
            min_interval_s,
            max_interval_s,
            std_dev_s,
            count,
        }) => vec![
            topic.clone(),
            format!("{rate_hz:.3}"),
            format!("{min_interval_s:.3}"),
            format!("{max_interval_s:.3}"),
            format!("{std_dev_s:.5}"),
            count.to_string(),
        ],
        StatsSnapshot::Delay(DelayStats {
            topic,
            mean_delay_s,
            min_delay_s,
            max_delay_s,
            std_dev_s,
            count,
        }) => vec![
            topic.clone(),
            format!("{mean_delay_s:.3}"),
            format!("{min_delay_s:.3}"),
            format!("{max_delay_s:.3}"),
            format!("{std_dev_s:.5}"),
            count.to_string(),
        ],
    }
}

// ─── Public entry points ─────────────────────────────────────────

/// Render one reporting tick.
///
/// Single-stream mode prints the first snapshot as a two-line block;
/// multi-stream mode builds a table. No snapshots render to nothing.
pub fn render(snapshots: &[StatsSnapshot], multi: bool) -> String {
    let Some(first) = snapshots.first() else {
        return String::new();
    };
    if !multi {
        return render_single(first);
    }

    let mut table = Table::new(header_for(first.kind()).iter().copied());
    for s in snapshots {
        table.push_row(table_row(s));
    }
    table.render()
}

/// One JSON object per line, one line per snapshot.
pub fn render_json(snapshots: &[StatsSnapshot]) -> serde_json::Result<String> {
    let mut out = String::new();
    for s in snapshots {
        out.push_str(&serde_json::to_string(s)?);
        out.push('\n');
    }
    Ok(out)
}

/// Cumulative run summary, one row per stream.
pub fn render_summary(kind: MetricKind, summaries: &[(StreamKey, PercentileSet)]) -> String {
    let unit = match kind {
        MetricKind::Bandwidth => "B",
        MetricKind::Rate | MetricKind::Delay => "us",
    };
    let mut table = Table::new(["topic", "count", "min", "p50", "p95", "p99", "max"]);
    for (topic, set) in summaries {
        table.push_row(vec![
            topic.clone(),
            set.count.to_string(),
            format!("{} {unit}", set.min),
            format!("{} {unit}", set.p50),
            format!("{} {unit}", set.p95),
            format!("{} {unit}", set.p99),
            format!("{} {unit}", set.max),
        ]);
    }
    table.render()
}

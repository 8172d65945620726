use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Output, OutputFormat};
use crate::present;
use crate::stats::{StatsCollector, StreamKey};

/// Moves the cursor home and clears the terminal.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Periodic task turning collector state into terminal output.
pub struct Reporter {
    pub(crate) collector: Arc<StatsCollector>,
    pub(crate) topics: Vec<StreamKey>,
    pub(crate) multi: bool,
    pub(crate) clear_screen: bool,
    pub(crate) format: OutputFormat,
    pub(crate) period: Duration,
}

impl Reporter {
    /// Report every period until `cancel` fires, then hand the writer back.
    pub async fn run(self, mut out: Output, cancel: CancellationToken) -> io::Result<Output> {
        let mut ticks = IntervalStream::new(tokio::time::interval(self.period));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    self.report(&mut out)?;
                }
            }
        }

        debug!("reporter stopped");
        Ok(out)
    }

    /// One tick: snapshot every topic, drop the ones without fresh data,
    /// render what is left.
    pub fn report<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let snapshots = self.collector.compute_all(&self.topics);
        if snapshots.is_empty() {
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                out.write_all(present::render_json(&snapshots)?.as_bytes())?;
            }
            OutputFormat::Text => {
                let text = present::render(&snapshots, self.multi);
                if self.multi && self.clear_screen {
                    out.write_all(CLEAR_SCREEN.as_bytes())?;
                }
                out.write_all(text.as_bytes())?;
            }
        }
        out.flush()
    }
}

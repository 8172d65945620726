//! Orchestration of a monitoring run.
//!
//! A [`Monitor`] owns handles to the graph and the configuration. Each verb
//! resolves its topics, subscribes through the transport, and runs one
//! output task until the caller's cancellation token fires.

pub mod echo;
mod inspect;
pub mod reporter;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{Clock, Timestamp};
use crate::config::{MonitorConfig, TopicSelection};
use crate::error::{GraphError, MonitorError, SampleError};
use crate::graph::{Directory, MessageCallback, RawMessage, Subscription, Transport};
use crate::present;
use crate::qos::{QosNegotiator, QosOverrides, QosPreset};
use crate::stats::{MetricKind, StatsCollector};

pub use echo::{ActionInterface, EchoRequest};
pub use reporter::Reporter;

/// Destination of everything a verb prints.
pub type Output = Box<dyn Write + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Parameters of a `bw`, `hz` or `delay` run.
#[derive(Debug, Clone)]
pub struct StatsRequest {
    pub kind: MetricKind,
    pub selection: TopicSelection,
    pub preset: QosPreset,
    pub overrides: QosOverrides,
    pub format: OutputFormat,
    /// Print the cumulative percentile table on shutdown
    pub summary: bool,
}

impl StatsRequest {
    pub fn new(kind: MetricKind, selection: TopicSelection) -> Self {
        Self {
            kind,
            selection,
            preset: QosPreset::SensorData,
            overrides: QosOverrides::default(),
            format: OutputFormat::Text,
            summary: false,
        }
    }
}

pub struct Monitor {
    directory: Arc<dyn Directory>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        directory: Arc<dyn Directory>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            directory,
            transport,
            clock,
            config,
        }
    }

    // ─── Statistics verbs ────────────────────────────────────────

    /// Subscribe to the selected topics and report until `cancel` fires.
    pub async fn run_stats(
        &self,
        request: StatsRequest,
        mut out: Output,
        cancel: CancellationToken,
    ) -> Result<(), MonitorError> {
        let topics = match &request.selection {
            TopicSelection::Named(names) => names.clone(),
            TopicSelection::All { include_hidden } => {
                let names: Vec<String> = self
                    .directory
                    .topic_names_and_types(*include_hidden)
                    .into_iter()
                    .map(|(name, _types)| name)
                    .collect();
                if names.is_empty() {
                    writeln!(out, "No topics available")?;
                    return Ok(());
                }
                writeln!(out, "Subscribing to all {} available topics...", names.len())?;
                names
            }
        };

        let collector = Arc::new(StatsCollector::new(
            request.kind,
            self.config.window_size,
            self.clock.clone(),
        ));
        let negotiator = QosNegotiator::new(self.directory.as_ref(), request.preset);

        let mut subscriptions: Vec<Subscription> = Vec::with_capacity(topics.len());
        let mut resolved = Vec::with_capacity(topics.len());
        for topic in topics {
            if self.directory.topic_type(&topic).is_none() {
                warn!("failed to find message type for topic [{topic}]");
                continue;
            }
            let qos = negotiator.negotiate(&topic, &request.overrides);
            let callback = arrival_callback(request.kind, collector.clone(), topic.clone());
            match self.transport.subscribe(&topic, &qos, callback) {
                Ok(sub) => {
                    info!(topic = %topic, %qos, "subscribed");
                    writeln!(out, "Subscribed to [{topic}]")?;
                    subscriptions.push(sub);
                    resolved.push(topic);
                }
                Err(e) => warn!(topic = %topic, error = %e, "subscription failed"),
            }
        }
        if resolved.is_empty() {
            return Err(MonitorError::NoStreamsResolved);
        }
        out.flush()?;

        let multi = resolved.len() > 1;
        let reporter = Reporter {
            collector: collector.clone(),
            topics: resolved,
            multi,
            clear_screen: multi && request.format == OutputFormat::Text,
            format: request.format,
            period: self.config.report_period(),
        };
        let stop = CancellationToken::new();
        let mut handle = tokio::spawn(reporter.run(out, stop.clone()));

        // The reporter only finishes on its own if writing fails.
        let early = tokio::select! {
            _ = cancel.cancelled() => None,
            joined = &mut handle => Some(joined),
        };
        drop(subscriptions);

        let joined = match early {
            Some(joined) => Some(joined),
            None => {
                stop.cancel();
                join_bounded(handle, self.config.report_period()).await
            }
        };
        let Some(joined) = joined else {
            return Ok(());
        };
        let mut out = match joined {
            Ok(result) => result?,
            Err(e) => {
                warn!(error = %e, "reporter task failed");
                return Ok(());
            }
        };

        if request.summary {
            let summaries = collector.summaries();
            if !summaries.is_empty() {
                writeln!(out)?;
                out.write_all(present::render_summary(request.kind, &summaries).as_bytes())?;
                out.flush()?;
            }
        }
        Ok(())
    }

    // ─── Graph inspection ────────────────────────────────────────

    /// `list` verb: one topic per line, optionally with its types.
    pub fn list_topics(
        &self,
        mut out: Output,
        show_types: bool,
        include_hidden: bool,
    ) -> Result<(), MonitorError> {
        let listing = inspect::render_list(
            &self.directory.topic_names_and_types(include_hidden),
            show_types,
        );
        out.write_all(listing.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// `info` verb: the topic's publishers and the profile a statistics run
    /// would subscribe with.
    pub fn describe_topic(
        &self,
        mut out: Output,
        topic: &str,
        preset: QosPreset,
        overrides: &QosOverrides,
    ) -> Result<(), MonitorError> {
        let topic_type = self
            .directory
            .topic_type(topic)
            .ok_or_else(|| GraphError::UnknownTopic(topic.to_owned()))?;
        let publishers = self.directory.publishers_info_by_topic(topic);
        let negotiated = QosNegotiator::new(self.directory.as_ref(), preset).negotiate(topic, overrides);

        out.write_all(inspect::render_info(&topic_type, &publishers, &negotiated).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Value recorded for one arrival: payload size for bandwidth and rate, the
/// header-stamp age in nanoseconds for delay.
fn sample_value(kind: MetricKind, msg: &RawMessage, now: Timestamp) -> Result<u64, SampleError> {
    match kind {
        MetricKind::Bandwidth | MetricKind::Rate => Ok(msg.len() as u64),
        MetricKind::Delay => {
            let stamp = msg.stamp.ok_or(SampleError::MissingHeader)?;
            let age = now.saturating_since(stamp).as_nanos();
            Ok(u64::try_from(age).unwrap_or(u64::MAX))
        }
    }
}

fn arrival_callback(kind: MetricKind, collector: Arc<StatsCollector>, topic: String) -> MessageCallback {
    Arc::new(move |msg: RawMessage| {
        collector.record_arrival(&topic, |now| sample_value(kind, &msg, now));
    })
}

/// Wait for `handle` up to `timeout`, aborting it if it does not finish.
async fn join_bounded<T>(
    mut handle: JoinHandle<T>,
    timeout: Duration,
) -> Option<Result<T, tokio::task::JoinError>> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => Some(joined),
        Err(_elapsed) => {
            warn!("output task did not stop in time, aborting");
            handle.abort();
            None
        }
    }
}

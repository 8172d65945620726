//! Live traffic statistics for publish/subscribe topics.
//!
//! `topicstat` attaches to topics of a messaging graph and reports, on a fixed
//! cadence, their bandwidth, message rate or end-to-end delay over a sliding
//! window of recent samples. Subscriptions negotiate a delivery policy that
//! connects to every discovered publisher. An action echo mode dumps raw
//! introspection traffic through a bounded, drop-on-full queue.
//!
//! The graph itself is reached through the [`graph::Directory`] and
//! [`graph::Transport`] traits; [`sim::SimGraph`] implements both in-process.

pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod monitor;
pub mod present;
pub mod qos;
pub mod queue;
pub mod sim;
pub mod stats;

pub use config::{MonitorConfig, TopicSelection};
pub use error::{ConfigError, GraphError, MonitorError, SampleError};
pub use monitor::{EchoRequest, Monitor, Output, OutputFormat, StatsRequest};
pub use stats::{MetricKind, StatsCollector, StatsSnapshot};

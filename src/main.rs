use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use topicstat::clock::{Clock, MonotonicClock};
use topicstat::monitor::echo::DEFAULT_TRUNCATE_LENGTH;
use topicstat::qos::{Durability, History, Liveliness, QosOverrides, QosPreset, Reliability};
use topicstat::sim::{seed, GraphSpec, SimGraph};
use topicstat::{
    EchoRequest, MetricKind, Monitor, MonitorConfig, Output, OutputFormat, StatsRequest,
    TopicSelection,
};

/// Live bandwidth, rate and delay statistics for publish/subscribe topics.
#[derive(Parser)]
#[command(name = "topicstat", version, about)]
struct Cli {
    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON description of the simulated graph (defaults to the demo graph).
    #[arg(long)]
    graph: Option<PathBuf>,

    /// JSON file with monitor tunables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Display bandwidth used by topics.
    Bw(StatsArgs),
    /// Print the average publishing rate of topics.
    Hz(StatsArgs),
    /// Display delay of topics from the timestamp in their header.
    Delay(StatsArgs),
    /// Echo the introspection traffic of an action.
    Echo(EchoArgs),
    /// List the available topics.
    List {
        /// Additionally show the topic type.
        #[arg(short = 't', long)]
        show_types: bool,

        /// Consider hidden topics as well.
        #[arg(long)]
        include_hidden_topics: bool,
    },
    /// Show publishers of a topic and the subscription profile that would be used.
    Info {
        topic: String,

        #[command(flatten)]
        qos: QosArgs,
    },
}

#[derive(Args)]
struct StatsArgs {
    /// Topics to monitor (e.g. '/chatter').
    topics: Vec<String>,

    /// Monitor all available topics.
    #[arg(short, long)]
    all: bool,

    /// Maximum window size, in number of messages, used to compute statistics.
    #[arg(short, long)]
    window: Option<NonZeroUsize>,

    /// Consider hidden topics as well.
    #[arg(long)]
    include_hidden_topics: bool,

    /// Emit one JSON object per topic and report instead of text.
    #[arg(long)]
    json: bool,

    /// Print cumulative percentiles for every topic on exit.
    #[arg(long)]
    summary: bool,

    #[command(flatten)]
    qos: QosArgs,
}

#[derive(Args)]
struct EchoArgs {
    /// Name of the action to echo (e.g. '/fibonacci').
    action_name: String,

    /// Type of the action (e.g. 'example_interfaces/action/Fibonacci').
    action_type: Option<String>,

    /// '|'-separated interfaces to print: GOAL_SERVICE, CANCEL_SERVICE,
    /// RESULT_SERVICE, FEEDBACK_TOPIC, STATUS_TOPIC. Defaults to all.
    #[arg(short, long)]
    interfaces: Option<String>,

    /// Print payloads in full instead of truncating them.
    #[arg(short, long)]
    full_length: bool,

    /// Number of payload bytes shown before truncation.
    #[arg(short = 'l', long, default_value_t = DEFAULT_TRUNCATE_LENGTH)]
    truncate_length: usize,

    #[command(flatten)]
    qos: QosArgs,
}

#[derive(Args)]
struct QosArgs {
    /// Starting QoS preset.
    #[arg(long)]
    qos_profile: Option<QosPreset>,

    /// Queue size setting (only applied when positive).
    #[arg(long)]
    qos_depth: Option<usize>,

    #[arg(long)]
    qos_history: Option<History>,

    #[arg(long)]
    qos_reliability: Option<Reliability>,

    #[arg(long)]
    qos_durability: Option<Durability>,

    #[arg(long)]
    qos_liveliness: Option<Liveliness>,

    /// Liveliness lease duration in seconds (only applied when non-negative).
    #[arg(long, allow_negative_numbers = true)]
    qos_liveliness_lease_duration_seconds: Option<f64>,
}

impl QosArgs {
    fn overrides(&self) -> QosOverrides {
        QosOverrides {
            reliability: self.qos_reliability,
            durability: self.qos_durability,
            depth: self.qos_depth,
            history: self.qos_history,
            liveliness: self.qos_liveliness,
            liveliness_lease_duration_s: self.qos_liveliness_lease_duration_seconds,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MonitorConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cli, config))
}

async fn run(cli: Cli, mut config: MonitorConfig) -> Result<()> {
    let spec = match &cli.graph {
        Some(path) => GraphSpec::from_json_file(path)
            .with_context(|| format!("loading graph from {}", path.display()))?,
        None => seed::demo_graph(),
    };
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let graph = Arc::new(SimGraph::new(spec, clock.clone()));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(
        cancel.clone(),
        cli.duration_secs.map(Duration::from_secs),
    ));

    if let Command::Bw(args) | Command::Hz(args) | Command::Delay(args) = &cli.command {
        if let Some(window) = args.window {
            config.window_size = window.get();
        }
    }
    let monitor = Monitor::new(graph.clone(), graph, clock, config);
    let out: Output = Box::new(std::io::stdout());

    match cli.command {
        Command::Bw(args) => run_stats(&monitor, MetricKind::Bandwidth, args, out, cancel).await,
        Command::Hz(args) => run_stats(&monitor, MetricKind::Rate, args, out, cancel).await,
        Command::Delay(args) => run_stats(&monitor, MetricKind::Delay, args, out, cancel).await,
        Command::Echo(args) => {
            let request = EchoRequest {
                action_type: args.action_type,
                interfaces: args.interfaces,
                preset: args.qos.qos_profile.unwrap_or(QosPreset::ServicesDefault),
                overrides: args.qos.overrides(),
                truncate_length: (!args.full_length).then_some(args.truncate_length),
                ..EchoRequest::new(args.action_name)
            };
            monitor.run_echo(request, out, cancel).await?;
            Ok(())
        }
        Command::List {
            show_types,
            include_hidden_topics,
        } => {
            monitor.list_topics(out, show_types, include_hidden_topics)?;
            Ok(())
        }
        Command::Info { topic, qos } => {
            let preset = qos.qos_profile.unwrap_or(QosPreset::SensorData);
            monitor.describe_topic(out, &topic, preset, &qos.overrides())?;
            Ok(())
        }
    }
}

async fn run_stats(
    monitor: &Monitor,
    kind: MetricKind,
    args: StatsArgs,
    out: Output,
    cancel: CancellationToken,
) -> Result<()> {
    let selection = TopicSelection::new(args.topics, args.all, args.include_hidden_topics)?;
    let request = StatsRequest {
        preset: args.qos.qos_profile.unwrap_or(QosPreset::SensorData),
        overrides: args.qos.overrides(),
        format: if args.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        },
        summary: args.summary,
        ..StatsRequest::new(kind, selection)
    };
    monitor.run_stats(request, out, cancel).await?;
    info!("topicstat stopped");
    Ok(())
}

/// Cancel `token` on SIGINT, SIGTERM, or once `limit` has elapsed.
async fn shutdown_on_signal(token: CancellationToken, limit: Option<Duration>) {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = wait_for_signal() => {}
        _ = deadline => info!("run duration elapsed, shutting down"),
    }
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT, shutting down");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received SIGINT, shutting down");
}

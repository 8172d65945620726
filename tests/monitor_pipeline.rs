//! End-to-end runs of the monitor against the in-process graph.
//!
//! Tokio time is paused, so simulated publishers and the reporter advance on
//! exact virtual ticks and each run finishes instantly.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use topicstat::clock::{Clock, MonotonicClock};
use topicstat::qos::{QosOverrides, Reliability};
use topicstat::sim::{GraphSpec, SimGraph, SimPublisherSpec, SimTopicSpec};
use topicstat::{
    EchoRequest, MetricKind, Monitor, MonitorConfig, MonitorError, OutputFormat, StatsRequest,
    TopicSelection,
};

// ─── Helpers ─────────────────────────────────────────────────────

/// Writer whose contents stay readable after the monitor drops it.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn topic(name: &str, type_name: &str, publishers: Vec<SimPublisherSpec>) -> SimTopicSpec {
    SimTopicSpec {
        name: name.into(),
        type_name: type_name.into(),
        publishers,
    }
}

fn fixed(rate_hz: f64, size: usize) -> SimPublisherSpec {
    SimPublisherSpec {
        rate_hz,
        min_size: size,
        max_size: size,
        ..SimPublisherSpec::default()
    }
}

fn test_graph() -> GraphSpec {
    GraphSpec {
        topics: vec![
            topic("/chatter", "std_msgs/msg/String", vec![fixed(10.0, 20)]),
            topic("/counter", "std_msgs/msg/Int64", vec![fixed(5.0, 8)]),
            topic(
                "/scan",
                "sensor_msgs/msg/LaserScan",
                vec![SimPublisherSpec {
                    reliability: Reliability::BestEffort,
                    stamped: true,
                    latency_ms: 50.0,
                    ..fixed(20.0, 64)
                }],
            ),
            topic(
                "/fibonacci/_action/status",
                "action_msgs/msg/GoalStatusArray",
                vec![SimPublisherSpec {
                    durability: topicstat::qos::Durability::TransientLocal,
                    depth: 1,
                    ..fixed(2.0, 4)
                }],
            ),
            topic(
                "/fibonacci/_action/feedback",
                "example_interfaces/action/Fibonacci_FeedbackMessage",
                vec![fixed(4.0, 300)],
            ),
        ],
    }
}

fn monitor(spec: GraphSpec) -> Monitor {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let graph = Arc::new(SimGraph::new(spec, clock.clone()));
    Monitor::new(graph.clone(), graph, clock, MonitorConfig::default())
}

/// Cancellation token that fires after `after` of virtual time.
fn cancel_after(after: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    token
}

fn named(topics: &[&str]) -> TopicSelection {
    TopicSelection::Named(topics.iter().map(|t| t.to_string()).collect())
}

async fn run_stats(request: StatsRequest, spec: GraphSpec) -> (Result<(), MonitorError>, String) {
    let buf = SharedBuf::default();
    let result = monitor(spec)
        .run_stats(
            request,
            Box::new(buf.clone()),
            cancel_after(Duration::from_millis(3_500)),
        )
        .await;
    (result, buf.text())
}

// ─── Statistics verbs ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn bw_reports_fixed_size_messages() {
    let request = StatsRequest::new(MetricKind::Bandwidth, named(&["/chatter"]));
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("Subscribed to [/chatter]"));

    let reports: Vec<&str> = out.lines().filter(|l| l.contains(" B/s from ")).collect();
    assert!(reports.len() >= 2, "output was:\n{out}");
    for line in &reports {
        let (rate, rest) = line.split_once(" B/s from ").unwrap();
        assert!(rate.parse::<u64>().is_ok(), "bad rate in {line:?}");
        let count = rest.strip_suffix(" messages").unwrap();
        assert!(count.parse::<usize>().is_ok(), "bad count in {line:?}");
    }
    assert!(out.contains("\tMessage size mean: 20 B min: 20 B max: 20 B\n"));
}

#[tokio::test(start_paused = true)]
async fn hz_reports_average_rate() {
    let request = StatsRequest::new(MetricKind::Rate, named(&["/counter"]));
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    let rate_line = out
        .lines()
        .find(|l| l.starts_with("average rate: "))
        .unwrap_or_else(|| panic!("no rate line in:\n{out}"));
    let hz: f64 = rate_line["average rate: ".len()..].parse().unwrap();
    assert!((4.0..=6.0).contains(&hz), "rate was {hz}");
    assert!(out.contains("\tmin: 0.200s max: 0.200s std dev: 0.00000s window: "));
}

#[tokio::test(start_paused = true)]
async fn delay_measures_header_stamp_age() {
    let request = StatsRequest::new(MetricKind::Delay, named(&["/scan"]));
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    let delay_line = out
        .lines()
        .filter(|l| l.starts_with("average delay: "))
        .last()
        .unwrap_or_else(|| panic!("no delay line in:\n{out}"));
    let delay: f64 = delay_line["average delay: ".len()..].parse().unwrap();
    assert!((0.0..=0.06).contains(&delay), "delay was {delay}");
}

#[tokio::test(start_paused = true)]
async fn several_topics_render_as_a_table() {
    let request = StatsRequest::new(MetricKind::Bandwidth, named(&["/chatter", "/counter"]));
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    assert!(out.contains("Subscribed to [/chatter]\nSubscribed to [/counter]\n"));
    assert!(out.contains("\x1b[2J\x1b[H"));
    assert!(out.contains("bandwidth"));
    assert!(out.lines().any(|l| l.starts_with("/counter ")));
}

#[tokio::test(start_paused = true)]
async fn json_mode_emits_tagged_objects() {
    let request = StatsRequest {
        format: OutputFormat::Json,
        ..StatsRequest::new(MetricKind::Bandwidth, named(&["/chatter"]))
    };
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    let objects: Vec<serde_json::Value> = out
        .lines()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(!objects.is_empty(), "output was:\n{out}");
    assert_eq!(objects[0]["metric"], "bandwidth");
    assert_eq!(objects[0]["topic"], "/chatter");
    assert_eq!(objects[0]["min"], 20);
}

#[tokio::test(start_paused = true)]
async fn summary_follows_the_last_report() {
    let request = StatsRequest {
        summary: true,
        ..StatsRequest::new(MetricKind::Bandwidth, named(&["/chatter"]))
    };
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();

    let summary = out.rsplit("\n\n").next().unwrap();
    assert!(summary.contains("p50"), "output was:\n{out}");
    assert!(summary.lines().any(|l| l.starts_with("/chatter ") && l.contains("20 B")));
}

#[tokio::test(start_paused = true)]
async fn unresolvable_topics_fail_the_run() {
    let request = StatsRequest::new(MetricKind::Bandwidth, named(&["/does_not_exist"]));
    let (result, out) = run_stats(request, test_graph()).await;
    assert!(matches!(result, Err(MonitorError::NoStreamsResolved)));
    assert!(!out.contains("Subscribed to"));
}

#[tokio::test(start_paused = true)]
async fn missing_topics_are_skipped() {
    let request = StatsRequest::new(MetricKind::Bandwidth, named(&["/does_not_exist", "/chatter"]));
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();
    assert!(out.starts_with("Subscribed to [/chatter]\n"));
    assert!(!out.contains("\x1b[2J"));
}

#[tokio::test(start_paused = true)]
async fn all_topics_on_an_empty_graph() {
    let request = StatsRequest::new(
        MetricKind::Bandwidth,
        TopicSelection::All {
            include_hidden: false,
        },
    );
    let (result, out) = run_stats(request, GraphSpec { topics: vec![] }).await;
    result.unwrap();
    assert_eq!(out, "No topics available\n");
}

#[tokio::test(start_paused = true)]
async fn all_topics_skips_hidden_ones() {
    let request = StatsRequest::new(
        MetricKind::Rate,
        TopicSelection::All {
            include_hidden: false,
        },
    );
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();
    assert!(out.starts_with("Subscribing to all 3 available topics...\n"));
    assert!(!out.contains("_action"));
}

#[tokio::test(start_paused = true)]
async fn forced_reliable_subscription_hears_nothing_from_best_effort() {
    let request = StatsRequest {
        overrides: QosOverrides {
            reliability: Some(Reliability::Reliable),
            ..QosOverrides::default()
        },
        ..StatsRequest::new(MetricKind::Bandwidth, named(&["/scan"]))
    };
    let (result, out) = run_stats(request, test_graph()).await;
    result.unwrap();
    assert_eq!(out, "Subscribed to [/scan]\n");
}

// ─── Action echo ─────────────────────────────────────────────────

async fn run_echo(request: EchoRequest) -> (Result<(), MonitorError>, String) {
    let buf = SharedBuf::default();
    let result = monitor(test_graph())
        .run_echo(
            request,
            Box::new(buf.clone()),
            cancel_after(Duration::from_millis(2_100)),
        )
        .await;
    (result, buf.text())
}

#[tokio::test(start_paused = true)]
async fn echo_prints_blocks_per_interface() {
    let (result, out) = run_echo(EchoRequest::new("/fibonacci")).await;
    result.unwrap();

    assert!(out.contains("interface: STATUS_TOPIC\nsize: 4\ndata: ["));
    assert!(out.contains("interface: FEEDBACK_TOPIC\nsize: 300\n"));
    assert!(out.contains(", '...']\n---\n"));
    for block in out.split_terminator("---\n") {
        assert!(block.starts_with("interface: "), "stray output: {block:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn echo_respects_interface_filter() {
    let request = EchoRequest {
        interfaces: Some("STATUS_TOPIC".into()),
        truncate_length: None,
        ..EchoRequest::new("/fibonacci")
    };
    let (result, out) = run_echo(request).await;
    result.unwrap();

    assert!(out.contains("interface: STATUS_TOPIC"));
    assert!(!out.contains("FEEDBACK_TOPIC"));
}

#[tokio::test(start_paused = true)]
async fn echo_rejects_unknown_actions() {
    let (result, out) = run_echo(EchoRequest::new("/nope")).await;
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "The action name '/nope' is invalid");
    assert!(out.is_empty());
}

#[tokio::test(start_paused = true)]
async fn echo_rejects_bad_interface_names() {
    let request = EchoRequest {
        interfaces: Some("STATUS_TOPIC|bogus".into()),
        ..EchoRequest::new("/fibonacci")
    };
    let (result, _out) = run_echo(request).await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "\"bogus\" is incorrect interface name."
    );
}

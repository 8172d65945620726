//! Action echo: raw dumps of an action's introspection traffic.
//!
//! Every interface callback pre-renders its block and hands it to the
//! [`IngestQueue`]; one consumer task writes blocks in arrival order, so
//! output from different interfaces never interleaves mid-block.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{join_bounded, Monitor, Output};
use crate::error::MonitorError;
use crate::graph::{MessageCallback, RawMessage, Subscription};
use crate::qos::{QosOverrides, QosPreset, QosProfile};
use crate::queue::IngestQueue;

/// Default number of payload bytes shown before `'...'`.
pub const DEFAULT_TRUNCATE_LENGTH: usize = 128;

/// Depth of the feedback subscription, matching what action clients use.
const FEEDBACK_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionInterface {
    GoalService,
    CancelService,
    ResultService,
    FeedbackTopic,
    StatusTopic,
}

impl ActionInterface {
    pub const ALL: [Self; 5] = [
        Self::GoalService,
        Self::CancelService,
        Self::ResultService,
        Self::FeedbackTopic,
        Self::StatusTopic,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::GoalService => "GOAL_SERVICE",
            Self::CancelService => "CANCEL_SERVICE",
            Self::ResultService => "RESULT_SERVICE",
            Self::FeedbackTopic => "FEEDBACK_TOPIC",
            Self::StatusTopic => "STATUS_TOPIC",
        }
    }

    /// Introspection topic carrying this interface for `action`.
    pub fn topic(self, action: &str) -> String {
        let suffix = match self {
            Self::GoalService => "send_goal/_service_event",
            Self::CancelService => "cancel_goal/_service_event",
            Self::ResultService => "get_result/_service_event",
            Self::FeedbackTopic => "feedback",
            Self::StatusTopic => "status",
        };
        format!("{action}/_action/{suffix}")
    }

    /// Service events use the configured profile; feedback and status use
    /// the fixed profiles action clients subscribe with.
    fn qos(self, configured: &QosProfile) -> QosProfile {
        match self {
            Self::GoalService | Self::CancelService | Self::ResultService => configured.clone(),
            Self::FeedbackTopic => QosProfile {
                depth: FEEDBACK_DEPTH,
                ..QosProfile::preset(QosPreset::Default)
            },
            Self::StatusTopic => QosProfile::preset(QosPreset::ActionStatusDefault),
        }
    }
}

impl fmt::Display for ActionInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ActionInterface {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let upper = name.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|i| i.tag() == upper)
            .ok_or_else(|| MonitorError::Usage(format!("\"{name}\" is incorrect interface name.")))
    }
}

/// Parse a `|`-separated interface list. `None` selects every interface.
pub fn parse_interfaces(list: Option<&str>) -> Result<BTreeSet<ActionInterface>, MonitorError> {
    match list {
        None => Ok(ActionInterface::ALL.into_iter().collect()),
        Some("") => Err(MonitorError::Usage(
            "Input action interface name is empty.".into(),
        )),
        Some(list) => list.split('|').map(str::parse).collect(),
    }
}

/// Parameters of an `echo` run.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub action: String,
    /// `pkg/action/Name`; when absent the action must be visible in the graph
    pub action_type: Option<String>,
    pub interfaces: Option<String>,
    pub preset: QosPreset,
    pub overrides: QosOverrides,
    /// `None` prints payloads in full
    pub truncate_length: Option<usize>,
}

impl EchoRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            action_type: None,
            interfaces: None,
            preset: QosPreset::ServicesDefault,
            overrides: QosOverrides::default(),
            truncate_length: Some(DEFAULT_TRUNCATE_LENGTH),
        }
    }
}

// ─── Block rendering ─────────────────────────────────────────────

/// One queue item: `interface: <TAG>`, the raw dump, and the `---` terminator.
pub fn render_block(interface: ActionInterface, msg: &RawMessage, truncate_length: Option<usize>) -> String {
    let mut block = String::with_capacity(64 + msg.len() * 5);
    let _ = writeln!(block, "interface: {interface}");
    if let Some(stamp) = msg.stamp {
        let _ = writeln!(block, "stamp: {stamp}");
    }
    let _ = writeln!(block, "size: {}", msg.len());

    let shown = match truncate_length {
        Some(limit) => &msg.payload[..msg.len().min(limit)],
        None => &msg.payload[..],
    };
    block.push_str("data: [");
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            block.push_str(", ");
        }
        let _ = write!(block, "{byte}");
    }
    if shown.len() < msg.len() {
        block.push_str(if shown.is_empty() { "'...'" } else { ", '...'" });
    }
    block.push_str("]\n---");
    block
}

fn block_callback(interface: ActionInterface, queue: IngestQueue, truncate_length: Option<usize>) -> MessageCallback {
    Arc::new(move |msg: RawMessage| {
        // A full queue is already logged by the queue itself.
        let _ = queue.try_push(render_block(interface, &msg, truncate_length));
    })
}

/// Action types look like `pkg/action/Name`.
fn is_action_type(name: &str) -> bool {
    let parts: Vec<&str> = name.split('/').collect();
    matches!(parts.as_slice(), [pkg, "action", ty] if !pkg.is_empty() && !ty.is_empty())
}

// ─── Orchestration ───────────────────────────────────────────────

impl Monitor {
    /// Dump the selected interfaces of an action until `cancel` fires.
    pub async fn run_echo(
        &self,
        request: EchoRequest,
        out: Output,
        cancel: CancellationToken,
    ) -> Result<(), MonitorError> {
        let interfaces = parse_interfaces(request.interfaces.as_deref())?;
        match &request.action_type {
            Some(ty) if !is_action_type(ty) => {
                return Err(MonitorError::Usage(format!("The service type '{ty}' is invalid")));
            }
            Some(_) => {}
            None => {
                let prefix = format!("{}/_action/", request.action);
                let known = self
                    .directory
                    .topic_names_and_types(true)
                    .iter()
                    .any(|(name, _)| name.starts_with(&prefix));
                if !known {
                    return Err(MonitorError::Usage(format!(
                        "The action name '{}' is invalid",
                        request.action
                    )));
                }
            }
        }

        let configured = QosProfile::from_overrides(request.preset, &request.overrides);
        let (queue, consumer) = IngestQueue::new(self.config.queue_capacity);
        let consumer = consumer.with_poll_timeout(self.config.poll_timeout());

        let mut subscriptions: Vec<Subscription> = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            let topic = interface.topic(&request.action);
            let callback = block_callback(interface, queue.clone(), request.truncate_length);
            match self.transport.subscribe(&topic, &interface.qos(&configured), callback) {
                Ok(sub) => {
                    info!(topic = %topic, %interface, "subscribed");
                    subscriptions.push(sub);
                }
                Err(e) => warn!(topic = %topic, error = %e, "subscription failed"),
            }
        }
        if subscriptions.is_empty() {
            return Err(MonitorError::NoStreamsResolved);
        }

        let stop = CancellationToken::new();
        let mut handle = tokio::spawn(consumer.run(out, stop.clone()));

        let early = tokio::select! {
            _ = cancel.cancelled() => None,
            joined = &mut handle => Some(joined),
        };
        drop(subscriptions);

        let joined = match early {
            Some(joined) => Some(joined),
            None => {
                stop.cancel();
                join_bounded(handle, self.config.join_timeout()).await
            }
        };
        if queue.dropped() > 0 {
            warn!(dropped = queue.dropped(), "output queue overflowed during the run");
        }
        debug!("echo finished");

        match joined {
            Some(Ok(result)) => result.map_err(MonitorError::from),
            Some(Err(e)) => {
                warn!(error = %e, "output task failed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

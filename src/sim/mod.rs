//! In-process message graph.
//!
//! Stands in for the external directory and transport so the monitor can run
//! end to end: topics and publishers come from a [`GraphSpec`], and every
//! subscription spawns one task per compatible publisher that invokes the
//! subscriber's callback at the publisher's rate.

mod publisher;
pub mod seed;

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::GraphError;
use crate::graph::{
    is_hidden_topic, Directory, EndpointInfo, MessageCallback, Subscription, Transport,
};
use crate::qos::{Durability, History, Liveliness, QosProfile, Reliability};

// ─── Graph description ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub topics: Vec<SimTopicSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimTopicSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub publishers: Vec<SimPublisherSpec>,
}

/// One simulated publisher and the traffic it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimPublisherSpec {
    pub node: String,
    pub namespace: String,
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    pub depth: usize,
    /// Messages per second; zero publishes nothing
    pub rate_hz: f64,
    pub min_size: usize,
    pub max_size: usize,
    /// Whether messages carry a header stamp
    pub stamped: bool,
    /// Age of the header stamp at delivery
    pub latency_ms: f64,
}

impl Default for SimPublisherSpec {
    fn default() -> Self {
        Self {
            node: "publisher".into(),
            namespace: "/".into(),
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            history: History::KeepLast,
            depth: 10,
            rate_hz: 1.0,
            min_size: 0,
            max_size: 0,
            stamped: false,
            latency_ms: 0.0,
        }
    }
}

impl SimPublisherSpec {
    fn offered_qos(&self) -> QosProfile {
        QosProfile {
            reliability: self.reliability,
            durability: self.durability,
            history: self.history,
            depth: self.depth,
            liveliness: Liveliness::Automatic,
            liveliness_lease_duration: None,
        }
    }
}

impl GraphSpec {
    pub fn from_json_file(path: &Path) -> Result<Self, GraphError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Description(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| GraphError::Description(format!("{}: {e}", path.display())))
    }
}

// ─── SimGraph ────────────────────────────────────────────────────

pub struct SimGraph {
    topics: BTreeMap<String, SimTopicSpec>,
    clock: Arc<dyn Clock>,
}

impl SimGraph {
    pub fn new(spec: GraphSpec, clock: Arc<dyn Clock>) -> Self {
        let topics = spec
            .topics
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self { topics, clock }
    }
}

impl Directory for SimGraph {
    fn topic_names_and_types(&self, include_hidden: bool) -> Vec<(String, Vec<String>)> {
        self.topics
            .values()
            .filter(|t| include_hidden || !is_hidden_topic(&t.name))
            .map(|t| (t.name.clone(), vec![t.type_name.clone()]))
            .collect()
    }

    fn topic_type(&self, topic: &str) -> Option<String> {
        self.topics.get(topic).map(|t| t.type_name.clone())
    }

    fn publishers_info_by_topic(&self, topic: &str) -> Vec<EndpointInfo> {
        let Some(t) = self.topics.get(topic) else {
            return Vec::new();
        };
        t.publishers
            .iter()
            .map(|p| EndpointInfo {
                node_name: p.node.clone(),
                node_namespace: p.namespace.clone(),
                topic_type: t.type_name.clone(),
                reliability: p.reliability,
                durability: p.durability,
                history: p.history,
                depth: p.depth,
            })
            .collect()
    }
}

impl Transport for SimGraph {
    fn subscribe(
        &self,
        topic: &str,
        qos: &QosProfile,
        callback: MessageCallback,
    ) -> Result<Subscription, GraphError> {
        let t = self
            .topics
            .get(topic)
            .ok_or_else(|| GraphError::UnknownTopic(topic.to_owned()))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| GraphError::Subscribe {
            topic: topic.to_owned(),
            reason: e.to_string(),
        })?;

        let token = CancellationToken::new();
        for (idx, p) in t.publishers.iter().enumerate() {
            if !qos.accepts(&p.offered_qos()) {
                warn!(
                    "New publisher discovered on topic '{topic}', offering incompatible QoS. \
                     No messages will be received from it."
                );
                continue;
            }
            if p.rate_hz <= 0.0 {
                continue;
            }
            debug!(topic = %topic, node = %p.node, "connecting simulated publisher");
            runtime.spawn(publisher::run(
                p.clone(),
                topic.to_owned(),
                callback.clone(),
                self.clock.clone(),
                token.child_token(),
                publisher_seed(topic, idx),
            ));
        }

        Ok(Subscription::new(topic, token))
    }
}

fn publisher_seed(topic: &str, idx: usize) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    topic.hash(&mut hasher);
    idx.hash(&mut hasher);
    hasher.finish().wrapping_add(1000)
}

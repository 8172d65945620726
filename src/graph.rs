//! Interfaces to the messaging graph.
//!
//! The directory answers "what exists" (topics, types, publishers and their
//! advertised policies); the transport delivers raw messages to a registered
//! callback. Both live outside this crate; [`crate::sim`] provides an
//! in-process implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::clock::Timestamp;
use crate::error::GraphError;
use crate::qos::{Durability, History, QosProfile, Reliability};

/// One delivered message, still serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    /// Header stamp, for message types that carry one.
    pub stamp: Option<Timestamp>,
}

impl RawMessage {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A publisher as advertised by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub node_name: String,
    pub node_namespace: String,
    pub topic_type: String,
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    pub depth: usize,
}

/// Invoked once per delivered message. Callbacks for different topics may
/// run concurrently.
pub type MessageCallback = Arc<dyn Fn(RawMessage) + Send + Sync>;

/// Live registration with the transport. Dropping it unsubscribes.
pub struct Subscription {
    topic: String,
    _guard: DropGuard,
}

impl Subscription {
    /// Wrap a token the transport watches; the token is cancelled on drop.
    pub fn new(topic: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            topic: topic.into(),
            _guard: token.drop_guard(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}

pub trait Directory: Send + Sync {
    /// Every known topic with its type names, sorted by name.
    fn topic_names_and_types(&self, include_hidden: bool) -> Vec<(String, Vec<String>)>;

    /// The message type of `topic`, or `None` if nobody advertises it.
    fn topic_type(&self, topic: &str) -> Option<String>;

    fn publishers_info_by_topic(&self, topic: &str) -> Vec<EndpointInfo>;
}

pub trait Transport: Send + Sync {
    fn subscribe(
        &self,
        topic: &str,
        qos: &QosProfile,
        callback: MessageCallback,
    ) -> Result<Subscription, GraphError>;
}

/// Hidden topics have a name segment starting with an underscore.
pub fn is_hidden_topic(topic: &str) -> bool {
    topic.split('/').any(|segment| segment.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_topic_detection() {
        assert!(is_hidden_topic("/fibonacci/_action/status"));
        assert!(is_hidden_topic("/_private"));
        assert!(!is_hidden_topic("/chatter"));
        assert!(!is_hidden_topic("/camera/image_raw"));
    }

    #[test]
    fn dropping_subscription_cancels_token() {
        let token = CancellationToken::new();
        let sub = Subscription::new("/chatter", token.clone());
        assert_eq!(sub.topic(), "/chatter");
        assert!(!token.is_cancelled());
        drop(sub);
        assert!(token.is_cancelled());
    }
}

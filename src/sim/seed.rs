use super::{GraphSpec, SimPublisherSpec, SimTopicSpec};
use crate::qos::{Durability, Reliability};

// ─── Demo topics ─────────────────────────────────────────────────

/// VGA rgb8 frame.
const IMAGE_BYTES: usize = 640 * 480 * 3;
/// 720-beam scan: ranges plus intensities and header.
const SCAN_BYTES: usize = 720 * 4 * 2 + 56;

/// Action whose introspection topics are simulated.
pub const DEMO_ACTION: &str = "/fibonacci";

fn topic(name: &str, type_name: &str, publishers: Vec<SimPublisherSpec>) -> SimTopicSpec {
    SimTopicSpec {
        name: name.into(),
        type_name: type_name.into(),
        publishers,
    }
}

fn publisher(node: &str, rate_hz: f64, min_size: usize, max_size: usize) -> SimPublisherSpec {
    SimPublisherSpec {
        node: node.into(),
        rate_hz,
        min_size,
        max_size,
        ..SimPublisherSpec::default()
    }
}

/// A small robot-like graph: text chatter, sensor streams with header
/// stamps, a topic whose publishers disagree on reliability, a latched
/// topic, and the introspection topics of one action.
pub fn demo_graph() -> GraphSpec {
    let action = |suffix: &str| format!("{DEMO_ACTION}/_action/{suffix}");

    GraphSpec {
        topics: vec![
            topic(
                "/chatter",
                "std_msgs/msg/String",
                vec![publisher("talker", 10.0, 12, 40)],
            ),
            topic(
                "/scan",
                "sensor_msgs/msg/LaserScan",
                vec![SimPublisherSpec {
                    reliability: Reliability::BestEffort,
                    stamped: true,
                    latency_ms: 3.0,
                    ..publisher("lidar_driver", 40.0, SCAN_BYTES, SCAN_BYTES)
                }],
            ),
            topic(
                "/camera/image_raw",
                "sensor_msgs/msg/Image",
                vec![
                    SimPublisherSpec {
                        stamped: true,
                        latency_ms: 12.0,
                        ..publisher("camera_driver", 30.0, IMAGE_BYTES, IMAGE_BYTES)
                    },
                    SimPublisherSpec {
                        reliability: Reliability::BestEffort,
                        stamped: true,
                        latency_ms: 25.0,
                        ..publisher("image_relay", 15.0, IMAGE_BYTES, IMAGE_BYTES)
                    },
                ],
            ),
            topic(
                "/odom",
                "nav_msgs/msg/Odometry",
                vec![SimPublisherSpec {
                    stamped: true,
                    latency_ms: 1.0,
                    ..publisher("base_controller", 50.0, 720, 720)
                }],
            ),
            topic(
                "/tf_static",
                "tf2_msgs/msg/TFMessage",
                vec![SimPublisherSpec {
                    durability: Durability::TransientLocal,
                    depth: 1,
                    ..publisher("robot_state_publisher", 0.5, 180, 260)
                }],
            ),
            topic(
                &action("send_goal/_service_event"),
                "example_interfaces/action/Fibonacci_SendGoal_Event",
                vec![publisher("fibonacci_server", 0.5, 96, 96)],
            ),
            topic(
                &action("cancel_goal/_service_event"),
                "action_msgs/srv/CancelGoal_Event",
                vec![publisher("fibonacci_server", 0.2, 80, 80)],
            ),
            topic(
                &action("get_result/_service_event"),
                "example_interfaces/action/Fibonacci_GetResult_Event",
                vec![publisher("fibonacci_server", 0.5, 64, 160)],
            ),
            topic(
                &action("feedback"),
                "example_interfaces/action/Fibonacci_FeedbackMessage",
                vec![publisher("fibonacci_server", 2.0, 24, 80)],
            ),
            topic(
                &action("status"),
                "action_msgs/msg/GoalStatusArray",
                vec![SimPublisherSpec {
                    durability: Durability::TransientLocal,
                    depth: 1,
                    ..publisher("fibonacci_server", 1.0, 32, 64)
                }],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_graph_has_unique_topics() {
        let graph = demo_graph();
        let mut names: Vec<_> = graph.topics.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), graph.topics.len());
    }

    #[test]
    fn camera_publishers_disagree_on_reliability() {
        let graph = demo_graph();
        let camera = graph
            .topics
            .iter()
            .find(|t| t.name == "/camera/image_raw")
            .unwrap();
        let reliable = camera
            .publishers
            .iter()
            .filter(|p| p.reliability == Reliability::Reliable)
            .count();
        assert_eq!(reliable, 1);
        assert_eq!(camera.publishers.len(), 2);
    }
}

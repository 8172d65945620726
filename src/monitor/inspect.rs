use std::fmt::Write as _;

use crate::graph::EndpointInfo;
use crate::qos::QosProfile;

pub(crate) fn render_list(topics: &[(String, Vec<String>)], show_types: bool) -> String {
    let mut out = String::new();
    for (name, types) in topics {
        if show_types {
            let _ = writeln!(out, "{name} [{}]", types.join(", "));
        } else {
            let _ = writeln!(out, "{name}");
        }
    }
    out
}

pub(crate) fn render_info(topic_type: &str, publishers: &[EndpointInfo], negotiated: &QosProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Type: {topic_type}");
    let _ = writeln!(out, "Publisher count: {}", publishers.len());

    for p in publishers {
        let _ = writeln!(out);
        let _ = writeln!(out, "Node name: {}", p.node_name);
        let _ = writeln!(out, "Node namespace: {}", p.node_namespace);
        let _ = writeln!(out, "Topic type: {}", p.topic_type);
        let _ = writeln!(out, "QoS profile:");
        let _ = writeln!(out, "  Reliability: {}", p.reliability);
        let _ = writeln!(out, "  Durability: {}", p.durability);
        let _ = writeln!(out, "  History (depth): {} ({})", p.history, p.depth);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Subscription QoS: {negotiated}");
    out
}

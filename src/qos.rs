//! Delivery policies and subscriber-side negotiation.
//!
//! A subscription only connects to publishers whose offered policy satisfies
//! what it requests. Reliability and durability are each a two-point lattice
//! (strong / weak): a strong request is refused by a weak offer, a weak
//! request accepts both. The negotiator therefore picks the strong point only
//! when every discovered publisher offers it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::graph::{Directory, EndpointInfo};

// ─── Policy enums ────────────────────────────────────────────────

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct QosParseError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Declares a policy enum together with its short keys.
macro_rules! short_key_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const SHORT_KEYS: &'static [&'static str] = &[$($key),+];

            pub fn short_key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl FromStr for $name {
            type Err = QosParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($key => Ok(Self::$variant),)+
                    _ => Err(QosParseError {
                        kind: $kind,
                        value: s.to_owned(),
                        expected: concat!($($key, " "),+),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.short_key())
            }
        }
    };
}

short_key_enum!(
    /// Whether lost samples are retransmitted.
    Reliability, "reliability", {
        SystemDefault => "system_default",
        Reliable => "reliable",
        BestEffort => "best_effort",
    }
);

short_key_enum!(
    /// Whether late-joining subscribers receive already-published samples.
    Durability, "durability", {
        SystemDefault => "system_default",
        TransientLocal => "transient_local",
        Volatile => "volatile",
    }
);

short_key_enum!(History, "history", {
    SystemDefault => "system_default",
    KeepLast => "keep_last",
    KeepAll => "keep_all",
});

short_key_enum!(Liveliness, "liveliness", {
    SystemDefault => "system_default",
    Automatic => "automatic",
    ManualByTopic => "manual_by_topic",
});

short_key_enum!(
    /// Named starting points for a subscription profile.
    QosPreset, "qos profile", {
        Default => "default",
        SystemDefault => "system_default",
        SensorData => "sensor_data",
        ServicesDefault => "services_default",
        Parameters => "parameters",
        ParameterEvents => "parameter_events",
        ActionStatusDefault => "action_status_default",
    }
);

// ─── Lattice ─────────────────────────────────────────────────────

/// A two-point policy lattice: `STRONG` is only satisfied by `STRONG`.
pub trait PolicyLattice: Copy + Eq + fmt::Display {
    const STRONG: Self;
    const WEAK: Self;

    /// Whether a subscriber requesting `requested` connects to an `offered`
    /// publisher.
    fn accepts(requested: Self, offered: Self) -> bool {
        !(requested == Self::STRONG && offered == Self::WEAK)
    }
}

impl PolicyLattice for Reliability {
    const STRONG: Self = Reliability::Reliable;
    const WEAK: Self = Reliability::BestEffort;
}

impl PolicyLattice for Durability {
    const STRONG: Self = Durability::TransientLocal;
    const WEAK: Self = Durability::Volatile;
}

/// Outcome of settling one policy against every discovered publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement<P> {
    /// Every publisher offers the strong point.
    Unanimous(P),
    /// Some, but not all, publishers offer the strong point.
    Mixed(P),
    /// No publisher offers the strong point.
    Weak(P),
}

impl<P: PolicyLattice> Settlement<P> {
    pub fn policy(self) -> P {
        match self {
            Self::Unanimous(p) | Self::Mixed(p) | Self::Weak(p) => p,
        }
    }
}

/// Settle on the strongest policy every offer can satisfy.
/// Returns `None` when there is nothing to settle against.
pub fn settle<P: PolicyLattice>(offers: impl IntoIterator<Item = P>) -> Option<Settlement<P>> {
    let (mut total, mut strong) = (0usize, 0usize);
    for offer in offers {
        total += 1;
        if offer == P::STRONG {
            strong += 1;
        }
    }
    match (total, strong) {
        (0, _) => None,
        (t, s) if t == s => Some(Settlement::Unanimous(P::STRONG)),
        (_, 0) => Some(Settlement::Weak(P::WEAK)),
        _ => Some(Settlement::Mixed(P::WEAK)),
    }
}

// ─── Profile ─────────────────────────────────────────────────────

/// Full delivery policy of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosProfile {
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    pub depth: usize,
    pub liveliness: Liveliness,
    /// `None` means infinite.
    pub liveliness_lease_duration: Option<Duration>,
}

impl QosProfile {
    pub fn preset(preset: QosPreset) -> Self {
        let keep_last = |depth, reliability, durability| Self {
            reliability,
            durability,
            history: History::KeepLast,
            depth,
            liveliness: Liveliness::SystemDefault,
            liveliness_lease_duration: None,
        };
        match preset {
            QosPreset::Default | QosPreset::ServicesDefault => {
                keep_last(10, Reliability::Reliable, Durability::Volatile)
            }
            QosPreset::SensorData => keep_last(5, Reliability::BestEffort, Durability::Volatile),
            QosPreset::Parameters | QosPreset::ParameterEvents => {
                keep_last(1000, Reliability::Reliable, Durability::Volatile)
            }
            QosPreset::ActionStatusDefault => {
                keep_last(1, Reliability::Reliable, Durability::TransientLocal)
            }
            QosPreset::SystemDefault => Self {
                reliability: Reliability::SystemDefault,
                durability: Durability::SystemDefault,
                history: History::SystemDefault,
                depth: 0,
                liveliness: Liveliness::SystemDefault,
                liveliness_lease_duration: None,
            },
        }
    }

    /// Apply user overrides in place.
    ///
    /// Depth is only taken when positive; otherwise a transient-local profile
    /// with no depth gets depth 1 so late joiners can receive anything at all.
    pub fn apply(&mut self, o: &QosOverrides) {
        if let Some(h) = o.history {
            self.history = h;
        }
        if let Some(d) = o.durability {
            self.durability = d;
        }
        if let Some(r) = o.reliability {
            self.reliability = r;
        }
        if let Some(l) = o.liveliness {
            self.liveliness = l;
        }
        if let Some(secs) = o.liveliness_lease_duration_s {
            if secs >= 0.0 {
                match Duration::try_from_secs_f64(secs) {
                    Ok(lease) => self.liveliness_lease_duration = Some(lease),
                    Err(e) => warn!(lease_s = secs, error = %e, "ignoring liveliness lease duration"),
                }
            }
        }
        match o.depth {
            Some(depth) if depth > 0 => self.depth = depth,
            _ => {
                if self.durability == Durability::TransientLocal && self.depth == 0 {
                    self.depth = 1;
                }
            }
        }
    }

    /// Preset with overrides applied.
    pub fn from_overrides(preset: QosPreset, o: &QosOverrides) -> Self {
        let mut profile = Self::preset(preset);
        profile.apply(o);
        profile
    }

    /// Whether a subscription with this profile connects to `offered`.
    pub fn accepts(&self, offered: &QosProfile) -> bool {
        Reliability::accepts(self.reliability, offered.reliability)
            && Durability::accepts(self.durability, offered.durability)
    }
}

impl fmt::Display for QosProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lease = match self.liveliness_lease_duration {
            Some(d) => format!("{:.3}s", d.as_secs_f64()),
            None => "infinite".to_owned(),
        };
        write!(
            f,
            "reliability: {}, durability: {}, history: {} ({}), liveliness: {} (lease {})",
            self.reliability, self.durability, self.history, self.depth, self.liveliness, lease,
        )
    }
}

/// Explicit user choices. Any field set disables discovery-based negotiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QosOverrides {
    pub reliability: Option<Reliability>,
    pub durability: Option<Durability>,
    pub depth: Option<usize>,
    pub history: Option<History>,
    pub liveliness: Option<Liveliness>,
    pub liveliness_lease_duration_s: Option<f64>,
}

impl QosOverrides {
    pub fn is_empty(&self) -> bool {
        self.reliability.is_none()
            && self.durability.is_none()
            && self.depth.is_none()
            && self.history.is_none()
            && self.liveliness.is_none()
            && self.liveliness_lease_duration_s.is_none()
    }
}

// ─── Negotiation ─────────────────────────────────────────────────

/// A policy on which discovered publishers disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixedPolicy {
    Reliability,
    Durability,
}

impl fmt::Display for MixedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliability => f.write_str(
                "Some, but not all, publishers are offering RELIABLE reliability. \
                 Falling back to BEST_EFFORT as it will connect to all publishers",
            ),
            Self::Durability => f.write_str(
                "Some, but not all, publishers are offering TRANSIENT_LOCAL durability. \
                 Falling back to VOLATILE as it will connect to all publishers",
            ),
        }
    }
}

/// Result of settling a preset against a set of publishers.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    pub profile: QosProfile,
    pub mixed: Vec<MixedPolicy>,
}

/// Adapt `preset` to the publishers in `endpoints`.
pub fn negotiate_against(preset: QosPreset, endpoints: &[EndpointInfo]) -> Negotiation {
    let mut profile = QosProfile::preset(preset);
    let mut mixed = Vec::new();

    if let Some(s) = settle(endpoints.iter().map(|e| e.reliability)) {
        if matches!(s, Settlement::Mixed(_)) {
            mixed.push(MixedPolicy::Reliability);
        }
        profile.reliability = s.policy();
    }
    if let Some(s) = settle(endpoints.iter().map(|e| e.durability)) {
        if matches!(s, Settlement::Mixed(_)) {
            mixed.push(MixedPolicy::Durability);
        }
        profile.durability = s.policy();
    }

    Negotiation { profile, mixed }
}

/// Picks the subscription profile for a topic.
pub struct QosNegotiator<'a> {
    directory: &'a dyn Directory,
    preset: QosPreset,
}

impl<'a> QosNegotiator<'a> {
    pub fn new(directory: &'a dyn Directory, preset: QosPreset) -> Self {
        Self { directory, preset }
    }

    /// Explicit overrides win outright; otherwise the preset is settled
    /// against the publishers currently advertising on `topic`.
    pub fn negotiate(&self, topic: &str, overrides: &QosOverrides) -> QosProfile {
        if !overrides.is_empty() {
            return QosProfile::from_overrides(self.preset, overrides);
        }

        let endpoints = self.directory.publishers_info_by_topic(topic);
        let negotiation = negotiate_against(self.preset, &endpoints);
        for m in &negotiation.mixed {
            warn!(topic = %topic, "{m}");
        }
        negotiation.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn endpoint(reliability: Reliability, durability: Durability) -> EndpointInfo {
        EndpointInfo {
            node_name: "talker".into(),
            node_namespace: "/".into(),
            topic_type: "std_msgs/msg/String".into(),
            reliability,
            durability,
            history: History::KeepLast,
            depth: 10,
        }
    }

    #[test]
    fn all_reliable_selects_reliable() {
        let eps = [
            endpoint(Reliability::Reliable, Durability::Volatile),
            endpoint(Reliability::Reliable, Durability::Volatile),
        ];
        let n = negotiate_against(QosPreset::SensorData, &eps);
        assert_eq!(n.profile.reliability, Reliability::Reliable);
        assert_eq!(n.profile.durability, Durability::Volatile);
        assert!(n.mixed.is_empty());
    }

    #[test]
    fn mixed_reliability_falls_back_with_warning() {
        let eps = [
            endpoint(Reliability::Reliable, Durability::Volatile),
            endpoint(Reliability::BestEffort, Durability::Volatile),
        ];
        let n = negotiate_against(QosPreset::Default, &eps);
        assert_eq!(n.profile.reliability, Reliability::BestEffort);
        assert_eq!(n.mixed, vec![MixedPolicy::Reliability]);
    }

    #[test]
    fn none_reliable_is_silent_best_effort() {
        let eps = [endpoint(Reliability::BestEffort, Durability::Volatile)];
        let n = negotiate_against(QosPreset::Default, &eps);
        assert_eq!(n.profile.reliability, Reliability::BestEffort);
        assert!(n.mixed.is_empty());
    }

    #[test]
    fn durability_settles_independently() {
        let eps = [
            endpoint(Reliability::Reliable, Durability::TransientLocal),
            endpoint(Reliability::Reliable, Durability::Volatile),
        ];
        let n = negotiate_against(QosPreset::SensorData, &eps);
        assert_eq!(n.profile.reliability, Reliability::Reliable);
        assert_eq!(n.profile.durability, Durability::Volatile);
        assert_eq!(n.mixed, vec![MixedPolicy::Durability]);

        let eps = [endpoint(Reliability::BestEffort, Durability::TransientLocal)];
        let n = negotiate_against(QosPreset::SensorData, &eps);
        assert_eq!(n.profile.durability, Durability::TransientLocal);
    }

    #[test]
    fn no_endpoints_keeps_preset() {
        let n = negotiate_against(QosPreset::SensorData, &[]);
        assert_eq!(n.profile, QosProfile::preset(QosPreset::SensorData));
        assert!(n.mixed.is_empty());
    }

    #[test]
    fn overrides_apply_on_top_of_preset() {
        let o = QosOverrides {
            reliability: Some(Reliability::Reliable),
            depth: Some(42),
            liveliness_lease_duration_s: Some(2.5),
            ..Default::default()
        };
        let p = QosProfile::from_overrides(QosPreset::SensorData, &o);
        assert_eq!(p.reliability, Reliability::Reliable);
        assert_eq!(p.durability, Durability::Volatile);
        assert_eq!(p.depth, 42);
        assert_eq!(p.liveliness_lease_duration, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn zero_depth_is_ignored_and_transient_local_gets_one() {
        let o = QosOverrides {
            durability: Some(Durability::TransientLocal),
            depth: Some(0),
            ..Default::default()
        };
        let p = QosProfile::from_overrides(QosPreset::SystemDefault, &o);
        assert_eq!(p.depth, 1);

        let p = QosProfile::from_overrides(QosPreset::SensorData, &o);
        assert_eq!(p.depth, 5);
    }

    #[test]
    fn negative_lease_is_ignored() {
        let o = QosOverrides {
            liveliness_lease_duration_s: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(
            QosProfile::from_overrides(QosPreset::Default, &o).liveliness_lease_duration,
            None
        );
        assert!(!o.is_empty());
    }

    #[test]
    fn unrepresentable_lease_is_ignored() {
        for secs in [f64::INFINITY, 1e20, f64::NAN] {
            let o = QosOverrides {
                liveliness_lease_duration_s: Some(secs),
                ..Default::default()
            };
            assert_eq!(
                QosProfile::from_overrides(QosPreset::Default, &o).liveliness_lease_duration,
                None,
                "lease {secs}"
            );
        }
    }

    /// Directory with one topic whose publishers disagree on reliability;
    /// counts publisher lookups.
    #[derive(Default)]
    struct CountingDirectory {
        lookups: AtomicUsize,
    }

    impl Directory for CountingDirectory {
        fn topic_names_and_types(&self, _include_hidden: bool) -> Vec<(String, Vec<String>)> {
            vec![("/mixed".into(), vec!["std_msgs/msg/String".into()])]
        }

        fn topic_type(&self, _topic: &str) -> Option<String> {
            Some("std_msgs/msg/String".into())
        }

        fn publishers_info_by_topic(&self, _topic: &str) -> Vec<EndpointInfo> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            vec![
                endpoint(Reliability::Reliable, Durability::Volatile),
                endpoint(Reliability::BestEffort, Durability::Volatile),
            ]
        }
    }

    /// Run `f` with every log line captured as text.
    fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || LogSink(sink.clone()))
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&buf.lock()).into_owned();
        (result, text)
    }

    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn explicit_overrides_skip_discovery() {
        let dir = CountingDirectory::default();
        let negotiator = QosNegotiator::new(&dir, QosPreset::SensorData);
        let o = QosOverrides {
            reliability: Some(Reliability::Reliable),
            ..Default::default()
        };

        let (profile, logs) = capture_logs(|| negotiator.negotiate("/mixed", &o));
        assert_eq!(dir.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(profile.reliability, Reliability::Reliable);
        assert!(!logs.contains("Falling back"), "{logs}");
    }

    #[test]
    fn discovery_warns_on_mixed_publishers() {
        let dir = CountingDirectory::default();
        let negotiator = QosNegotiator::new(&dir, QosPreset::Default);

        let (profile, logs) = capture_logs(|| negotiator.negotiate("/mixed", &QosOverrides::default()));
        assert_eq!(dir.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(profile.reliability, Reliability::BestEffort);
        assert!(
            logs.contains("Some, but not all, publishers are offering RELIABLE reliability"),
            "{logs}"
        );
        assert!(logs.contains("WARN"), "{logs}");
    }

    #[test]
    fn short_keys_round_trip_and_reject_garbage() {
        assert_eq!("best_effort".parse::<Reliability>(), Ok(Reliability::BestEffort));
        assert_eq!("TRANSIENT_LOCAL".parse::<Durability>(), Ok(Durability::TransientLocal));
        assert_eq!("sensor_data".parse::<QosPreset>(), Ok(QosPreset::SensorData));
        assert!("sometimes".parse::<Reliability>().is_err());
        assert_eq!(History::KeepAll.to_string(), "keep_all");
    }

    #[test]
    fn strong_request_refuses_weak_offer() {
        assert!(!Reliability::accepts(Reliability::Reliable, Reliability::BestEffort));
        assert!(Reliability::accepts(Reliability::BestEffort, Reliability::Reliable));
        assert!(!Durability::accepts(Durability::TransientLocal, Durability::Volatile));
        assert!(Durability::accepts(Durability::SystemDefault, Durability::Volatile));
    }
}

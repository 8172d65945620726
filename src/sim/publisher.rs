use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::SimPublisherSpec;
use crate::clock::{Clock, Timestamp};
use crate::graph::{MessageCallback, RawMessage};

/// Fastest simulated publisher: one message per millisecond.
const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Slowest simulated publisher: one message per day.
const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

// ─── Publisher loop ──────────────────────────────────────────────

/// Emit messages at the publisher's rate until `cancel` fires.
///
/// Each publisher gets its own deterministic RNG seeded uniquely.
pub(crate) async fn run(
    spec: SimPublisherSpec,
    topic: String,
    callback: MessageCallback,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ticker = tokio::time::interval(period_for(spec.rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let msg = next_message(&spec, &mut rng, clock.now());
                trace!(topic = %topic, node = %spec.node, size = msg.len(), "publish");
                callback(msg);
            }
        }
    }
}

/// Tick period for `rate_hz`, clamped to what the timer can represent.
fn period_for(rate_hz: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .unwrap_or(MAX_PERIOD)
        .clamp(MIN_PERIOD, MAX_PERIOD)
}

// ─── Message synthesis ───────────────────────────────────────────

fn next_message(spec: &SimPublisherSpec, rng: &mut StdRng, now: Timestamp) -> RawMessage {
    let size = if spec.max_size > spec.min_size {
        rng.gen_range(spec.min_size..=spec.max_size)
    } else {
        spec.min_size
    };
    let mut payload = vec![0u8; size];
    rng.fill(&mut payload[..]);

    let stamp = spec.stamped.then(|| {
        // Up to ±10 % jitter around the configured latency
        let base = spec.latency_ms.max(0.0);
        let jitter = if base > 0.0 {
            rng.gen_range(-0.1..=0.1) * base
        } else {
            0.0
        };
        let age = Duration::try_from_secs_f64((base + jitter) / 1_000.0).unwrap_or(Duration::MAX);
        now.saturating_sub(age)
    });

    RawMessage { payload, stamp }
}

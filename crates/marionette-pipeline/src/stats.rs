//! Stats sampler - rolling throughput from transport byte counters
//!
//! Samples the channel counters on a fixed interval and derives
//! throughput as delta-bytes over delta-time. Carries a per-counter
//! last-seen map in sampler state: a counter that shrinks (transport
//! reset) re-baselines instead of reporting negative throughput, and a
//! counter repeated within one poll is attributed only once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use marionette_core::EpochMillis;
use marionette_session::{PeerChannel, STAT_BYTES_RECEIVED};

use crate::MetricsHandle;

/// One throughput observation
#[derive(Clone, Debug, PartialEq)]
pub struct ThroughputReport {
    pub counter: String,
    pub kilobits_per_second: f64,
    pub delta_bytes: u64,
    pub delta_seconds: f64,
}

/// Stateful counter sampler
pub struct StatsSampler {
    monitors: Vec<String>,
    last_seen: HashMap<String, (EpochMillis, u64)>,
}

impl StatsSampler {
    /// Sampler watching the default monitor set (inbound bytes)
    pub fn new() -> Self {
        Self::with_monitors(vec![STAT_BYTES_RECEIVED.to_string()])
    }

    pub fn with_monitors(monitors: Vec<String>) -> Self {
        StatsSampler {
            monitors,
            last_seen: HashMap::new(),
        }
    }

    /// Ingest one poll's counter readings, producing a report per
    /// monitored counter that has an established baseline.
    pub fn sample(
        &mut self,
        now: EpochMillis,
        counters: &[(&str, u64)],
    ) -> Vec<ThroughputReport> {
        let mut reports = Vec::new();
        let mut attributed: HashSet<&str> = HashSet::new();

        for &(name, value) in counters {
            if !self.monitors.iter().any(|m| m == name) {
                continue;
            }
            if !attributed.insert(name) {
                continue; // Already attributed this poll
            }

            match self.last_seen.get(name).copied() {
                None => {
                    self.last_seen.insert(name.to_string(), (now, value));
                }
                Some((_, previous)) if value < previous => {
                    // Counter reset: new baseline, no report.
                    self.last_seen.insert(name.to_string(), (now, value));
                }
                Some((previous_time, previous)) => {
                    let delta_seconds =
                        now.millis_since(previous_time).max(0) as f64 / 1000.0;
                    if delta_seconds <= 0.0 {
                        continue;
                    }
                    let delta_bytes = value - previous;
                    let kilobytes_per_second = delta_bytes as f64 / delta_seconds / 1000.0;

                    reports.push(ThroughputReport {
                        counter: name.to_string(),
                        kilobits_per_second: kilobytes_per_second * 8.0,
                        delta_bytes,
                        delta_seconds,
                    });
                    self.last_seen.insert(name.to_string(), (now, value));
                }
            }
        }

        reports
    }
}

impl Default for StatsSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the channel counters until the channel closes
pub async fn run_stats(
    channel: Arc<PeerChannel>,
    interval: Duration,
    metrics: MetricsHandle,
) {
    let mut sampler = StatsSampler::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // First tick fires immediately and establishes the baseline.
    loop {
        ticker.tick().await;
        if !channel.is_open() {
            break;
        }

        let stats = channel.stats();
        let counters = [
            (STAT_BYTES_RECEIVED, stats.bytes_received),
            (marionette_session::STAT_BYTES_SENT, stats.bytes_sent),
        ];

        for report in sampler.sample(EpochMillis::now(), &counters) {
            tracing::debug!(
                counter = %report.counter,
                kbps = report.kilobits_per_second,
                "throughput"
            );
            if report.counter == STAT_BYTES_RECEIVED {
                metrics.lock().inbound_kilobits_per_second =
                    Some(report.kilobits_per_second);
            }
        }
    }
}

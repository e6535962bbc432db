//! Per-stage latency derivation
//!
//! Four stamps bracket one frame's life: capture start and extraction end
//! on the sender (carried in the frame group), receive and render
//! completion on the receiver. Stage latencies are their differences.

use std::sync::Arc;

use parking_lot::Mutex;

use marionette_core::EpochMillis;

/// Latency breakdown for one rendered frame, in milliseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencyReport {
    /// Detection + encoding on the sender (extraction - capture)
    pub extraction_ms: i64,
    /// Channel transit (receive - extraction)
    pub transmission_ms: i64,
    /// Reconstruction + draw (render - receive)
    pub render_ms: i64,
    /// End to end (render - capture)
    pub total_ms: i64,
}

impl LatencyReport {
    /// Derive stage latencies from the four boundary stamps
    pub fn from_stamps(
        capture: EpochMillis,
        extraction: EpochMillis,
        receive: EpochMillis,
        render: EpochMillis,
    ) -> Self {
        LatencyReport {
            extraction_ms: extraction.millis_since(capture),
            transmission_ms: receive.millis_since(extraction),
            render_ms: render.millis_since(receive),
            total_ms: render.millis_since(capture),
        }
    }
}

/// Rolling pipeline metrics, shared across the pipeline tasks
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineMetrics {
    /// Latest receiver-side latency breakdown
    pub latency: Option<LatencyReport>,
    /// Latest sender-side extraction time
    pub sender_extraction_ms: Option<i64>,
    /// Latest inbound throughput estimate
    pub inbound_kilobits_per_second: Option<f64>,
    /// Frames rendered since the session opened
    pub frames_rendered: u64,
    /// Frames transmitted since the session opened
    pub frames_sent: u64,
}

/// Shared handle to the metrics hub
pub type MetricsHandle = Arc<Mutex<PipelineMetrics>>;

/// Fresh, zeroed metrics handle
pub fn metrics_handle() -> MetricsHandle {
    Arc::new(Mutex::new(PipelineMetrics::default()))
}

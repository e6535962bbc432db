//! Pipeline configuration and context
//!
//! Everything the original design kept in ambient globals - video
//! dimensions, detector tuning, debug toggles - travels here explicitly.

use std::time::Duration;

use marionette_core::{DebugConfig, DetectorOptions};

/// Timer cadences for the pipeline tasks
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Send-loop cadence (capture through transmit)
    pub tick_interval: Duration,
    /// Stats sampler cadence
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tick_interval: Duration::from_millis(10),
            stats_interval: Duration::from_secs(1),
        }
    }
}

/// Per-session pipeline context, passed to both pipeline halves
#[derive(Clone, Debug)]
pub struct PipelineContext {
    /// Capture frame width in pixels
    pub video_width: u32,
    /// Capture frame height in pixels
    pub video_height: u32,
    /// Detector tuning forwarded on every estimate call
    pub detector_options: DetectorOptions,
    /// Operator debug toggles
    pub debug: DebugConfig,
}

impl Default for PipelineContext {
    fn default() -> Self {
        PipelineContext {
            video_width: 500,
            video_height: 500,
            detector_options: DetectorOptions::default(),
            debug: DebugConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadences() {
        let config = PipelineConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.stats_interval, Duration::from_secs(1));
    }
}

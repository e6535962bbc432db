//! Send loop - capture, detect, encode, transmit
//!
//! Runs on a self-rescheduling interval rather than a tight loop; a tick
//! that cannot transmit (channel not open, kill switch on) is abandoned
//! but the cadence is preserved. Nothing in the per-tick path is allowed
//! to end the loop except channel closure or capture failure at startup.

use std::sync::Arc;

use marionette_core::{EpochMillis, MarionetteError, MarionetteResult};
use marionette_session::PeerChannel;
use marionette_wire::FrameGroup;

use crate::{
    CameraFrame, Detector, DetectionTap, FrameSource, MetricsHandle, PipelineConfig,
    PipelineContext,
};

/// Sender half of the frame pipeline
pub struct FrameSender<S: FrameSource, D: Detector> {
    source: S,
    detector: D,
    channel: Arc<PeerChannel>,
    context: PipelineContext,
    config: PipelineConfig,
    metrics: MetricsHandle,
    detection_tap: Option<DetectionTap>,
    seq: u32,
    warned_kill_switch: bool,
}

impl<S: FrameSource, D: Detector> FrameSender<S, D> {
    pub fn new(
        source: S,
        detector: D,
        channel: Arc<PeerChannel>,
        context: PipelineContext,
        config: PipelineConfig,
        metrics: MetricsHandle,
    ) -> Self {
        FrameSender {
            source,
            detector,
            channel,
            context,
            config,
            metrics,
            detection_tap: None,
            seq: 0,
            warned_kill_switch: false,
        }
    }

    /// Attach a debug observer for raw detections
    pub fn with_detection_tap(mut self, tap: DetectionTap) -> Self {
        self.detection_tap = Some(tap);
        self
    }

    /// Run the send loop until the channel closes.
    ///
    /// The first capture is probed up front: a camera that cannot deliver
    /// frame one is fatal and the loop never starts.
    pub async fn run(mut self) -> MarionetteResult<()> {
        let probe = self
            .source
            .next_frame()
            .map_err(|e| MarionetteError::CaptureUnavailable(e.to_string()))?;
        tracing::info!(
            width = probe.width,
            height = probe.height,
            "capture ready, send loop starting"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if self.channel.is_closed() {
                tracing::info!("channel closed, send loop ending");
                return Ok(());
            }
            if !self.channel.is_open() {
                // Not open yet: skip this tick but keep the cadence.
                continue;
            }

            if self.context.debug.do_not_transmit {
                if !self.warned_kill_switch {
                    tracing::warn!("do-not-transmit is ON; holding cadence, sending nothing");
                    self.warned_kill_switch = true;
                }
                continue;
            }

            match self.tick().await {
                Ok(()) => {}
                Err(MarionetteError::ChannelClosed) => {
                    tracing::info!("channel closed mid-frame, send loop ending");
                    return Ok(());
                }
                Err(e) => {
                    // A bad frame must never stop the loop.
                    tracing::warn!("frame skipped: {}", e);
                }
            }
        }
    }

    /// One pipeline tick: capture, detect (faces then poses, both complete
    /// before encoding), encode, transmit the six-slot group.
    async fn tick(&mut self) -> MarionetteResult<()> {
        let capture_ts = EpochMillis::now();

        let frame = self.source.next_frame()?;
        let faces = self.detector.estimate_faces(&frame)?;
        let poses = self
            .detector
            .estimate_poses(&frame, &self.context.detector_options)?;

        if self.context.debug.show_detection_debug {
            if let Some(tap) = self.detection_tap.as_mut() {
                tap(&poses, &faces);
            }
        }

        let extraction_ts = EpochMillis::now();

        let group = FrameGroup::from_estimates(
            self.seq,
            poses.first(),
            faces.first(),
            capture_ts,
            extraction_ts,
        );
        self.seq = self.seq.wrapping_add(1);

        for message in group.into_messages() {
            self.channel.send_bytes(&message.encode()).await?;
        }

        let extraction_ms = extraction_ts.millis_since(capture_ts);
        {
            let mut metrics = self.metrics.lock();
            metrics.sender_extraction_ms = Some(extraction_ms);
            metrics.frames_sent += 1;
        }
        tracing::trace!(seq = self.seq, extraction_ms, "frame transmitted");

        Ok(())
    }
}

/// Convenience used by tests and embedders that fake capture
pub fn blank_frame(width: u32, height: u32) -> CameraFrame {
    CameraFrame {
        width,
        height,
        pixels: vec![0; (width * height * 4) as usize],
    }
}

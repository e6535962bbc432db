//! Pipeline launcher - wires an open session to its three tasks
//!
//! Once negotiation hands over an open session, both peers run the same
//! trio: send loop, receive handler, stats sampler. All three share the
//! session's channel and a metrics hub; none of them touches negotiation
//! state again.

use tokio::task::JoinHandle;

use marionette_core::MarionetteResult;
use marionette_session::OpenSession;

use crate::{
    metrics_handle, run_stats, AvatarRenderer, Detector, FrameReceiver, FrameSender,
    FrameSource, MetricsHandle, PipelineConfig, PipelineContext, SkeletonDefinition,
};

/// Handles to the running pipeline tasks
pub struct PipelineHandle {
    pub sender: JoinHandle<MarionetteResult<()>>,
    pub receiver: JoinHandle<MarionetteResult<()>>,
    pub stats: JoinHandle<()>,
    pub metrics: MetricsHandle,
    /// The session, retained for orderly disconnect
    pub session: OpenSession,
}

impl PipelineHandle {
    /// Orderly shutdown: close the channel (which ends all three tasks)
    /// then the relay connection.
    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }
}

/// Start the full pipeline over an open session.
///
/// The channel events receiver moves into the receive handler; the send
/// loop and the stats sampler share the channel handle.
pub fn launch<S, D, R>(
    mut session: OpenSession,
    source: S,
    detector: D,
    renderer: R,
    surface: R::Surface,
    skeleton: SkeletonDefinition,
    context: PipelineContext,
    config: PipelineConfig,
) -> MarionetteResult<PipelineHandle>
where
    S: FrameSource + 'static,
    D: Detector + 'static,
    R: AvatarRenderer + 'static,
    R::Surface: 'static,
{
    let metrics = metrics_handle();
    let channel = session.channel.clone();
    let events = session.take_events().ok_or_else(|| {
        marionette_core::MarionetteError::NegotiationFailed(
            "session events already taken".into(),
        )
    })?;

    let sender = FrameSender::new(
        source,
        detector,
        channel.clone(),
        context.clone(),
        config.clone(),
        metrics.clone(),
    );
    let receiver = FrameReceiver::new(renderer, surface, skeleton, context, metrics.clone());

    let sender_task = tokio::spawn(sender.run());
    let receiver_task = tokio::spawn(receiver.run(events));
    let stats_task = tokio::spawn(run_stats(
        channel,
        config.stats_interval,
        metrics.clone(),
    ));

    Ok(PipelineHandle {
        sender: sender_task,
        receiver: receiver_task,
        stats: stats_task,
        metrics,
        session,
    })
}

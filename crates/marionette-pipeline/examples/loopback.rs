//! Loopback demo: two peers in one process
//!
//! Starts the reference relay, negotiates a session between two local
//! peers, and streams scripted pose detections from one to the other for
//! a couple of seconds, printing the latency breakdown.
//!
//! Run with: cargo run -p marionette-pipeline --example loopback

use std::time::Duration;

use marionette_core::{DetectorOptions, FaceEstimate, MarionetteResult, Point2, PoseEstimate};
use marionette_pipeline::{
    blank_frame, init_tracing, launch, AvatarRenderer, CameraFrame, Detector, FrameSource,
    PipelineConfig, PipelineContext, SkeletonDefinition,
};
use marionette_session::{PeerSession, SessionConfig};
use marionette_signal::SignalingRelay;

struct StaticCamera;

impl FrameSource for StaticCamera {
    fn next_frame(&mut self) -> MarionetteResult<CameraFrame> {
        Ok(blank_frame(500, 500))
    }
}

/// Waves the nose keypoint back and forth
struct WavingDetector {
    tick: u32,
}

impl Detector for WavingDetector {
    fn estimate_poses(
        &mut self,
        _frame: &CameraFrame,
        _options: &DetectorOptions,
    ) -> MarionetteResult<Vec<PoseEstimate>> {
        self.tick = self.tick.wrapping_add(1);
        let sweep = (self.tick % 200) as f32;

        let mut pose = PoseEstimate::empty(0.9);
        pose.keypoints[0].score = 0.8;
        pose.keypoints[0].position = Point2::new(150.0 + sweep, 80.0);
        Ok(vec![pose])
    }

    fn estimate_faces(&mut self, _frame: &CameraFrame) -> MarionetteResult<Vec<FaceEstimate>> {
        Ok(Vec::new())
    }
}

struct PrintingRenderer;

impl AvatarRenderer for PrintingRenderer {
    type Surface = ();

    fn bind_skeleton(&mut self, skeleton: SkeletonDefinition) {
        println!("skeleton bound: {}", skeleton.name);
    }

    fn update_skeleton(&mut self, pose: &PoseEstimate, _face: Option<&FaceEstimate>) {
        let nose = pose.keypoints[0].position;
        print!("\rnose at ({:5.1}, {:5.1})  score {:.2}", nose.x, nose.y, pose.score);
    }

    fn draw(&mut self, _surface: &mut (), _width: f32, _height: f32) {}
}

struct NullDetector;

impl Detector for NullDetector {
    fn estimate_poses(
        &mut self,
        _frame: &CameraFrame,
        _options: &DetectorOptions,
    ) -> MarionetteResult<Vec<PoseEstimate>> {
        Ok(Vec::new())
    }

    fn estimate_faces(&mut self, _frame: &CameraFrame) -> MarionetteResult<Vec<FaceEstimate>> {
        Ok(Vec::new())
    }
}

struct NullRenderer;

impl AvatarRenderer for NullRenderer {
    type Surface = ();
    fn bind_skeleton(&mut self, _skeleton: SkeletonDefinition) {}
    fn update_skeleton(&mut self, _pose: &PoseEstimate, _face: Option<&FaceEstimate>) {}
    fn draw(&mut self, _surface: &mut (), _width: f32, _height: f32) {}
}

fn skeleton() -> SkeletonDefinition {
    SkeletonDefinition {
        name: "girl".into(),
        svg: "<svg/>".into(),
    }
}

#[tokio::main]
async fn main() -> MarionetteResult<()> {
    init_tracing();

    // 1. Reference relay on loopback
    let relay = SignalingRelay::bind("127.0.0.1:0".parse().map_err(|_| {
        marionette_core::MarionetteError::TransportError("bad loopback addr".into())
    })?)
    .await?;
    let relay_addr = relay.local_addr();
    tokio::spawn(relay.run());
    println!("relay listening on {relay_addr}");

    // 2. Two peers; the sender initiates
    let mut config = SessionConfig::new(relay_addr);
    config.bind_addr = "127.0.0.1:0".parse().map_err(|_| {
        marionette_core::MarionetteError::TransportError("bad loopback addr".into())
    })?;

    let viewer = PeerSession::connect(config.clone()).await?;
    let mut performer = PeerSession::connect(config).await?;
    performer.initiate().await?;

    let (performer, viewer) = tokio::join!(performer.wait_open(), viewer.wait_open());
    let (performer, viewer) = (performer?, viewer?);
    println!(
        "session open: performer={:?} viewer={:?}",
        performer.session.role, viewer.session.role
    );

    // 3. Pipelines on both ends
    let mut performer_pipeline = launch(
        performer,
        StaticCamera,
        WavingDetector { tick: 0 },
        NullRenderer,
        (),
        skeleton(),
        PipelineContext::default(),
        PipelineConfig::default(),
    )?;
    let mut viewer_pipeline = launch(
        viewer,
        StaticCamera,
        NullDetector,
        PrintingRenderer,
        (),
        skeleton(),
        PipelineContext::default(),
        PipelineConfig::default(),
    )?;

    // 4. Stream for a couple of seconds
    tokio::time::sleep(Duration::from_secs(3)).await;

    let metrics = *viewer_pipeline.metrics.lock();
    println!("\nframes rendered: {}", metrics.frames_rendered);
    if let Some(latency) = metrics.latency {
        println!(
            "latency: extraction {}ms, transmission {}ms, render {}ms, total {}ms",
            latency.extraction_ms, latency.transmission_ms, latency.render_ms, latency.total_ms
        );
    }
    if let Some(kbps) = metrics.inbound_kilobits_per_second {
        println!("inbound throughput: {kbps:.1} kb/s");
    }

    // 5. Orderly teardown: channel first, then relay connection
    performer_pipeline.disconnect().await;
    viewer_pipeline.disconnect().await;

    Ok(())
}

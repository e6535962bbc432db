//! Marionette Pipeline - capture to render, instrumented
//!
//! The pipeline is symmetric: once a session opens, each peer runs a send
//! loop (capture -> detect -> encode -> transmit on a ~10ms cadence) and a
//! receive handler (reassemble -> decode -> reconstruct -> render), plus a
//! stats sampler polling the channel's byte counters once a second.
//!
//! Everything model- or canvas-shaped is a collaborator behind a trait:
//! detection, frame capture, and the avatar renderer are provided by the
//! embedding application and can be swapped freely.

pub mod collaborators;
pub mod context;
pub mod latency;
pub mod receiver;
pub mod runtime;
pub mod sender;
pub mod stats;

pub use collaborators::*;
pub use context::*;
pub use latency::*;
pub use receiver::*;
pub use runtime::*;
pub use sender::*;
pub use stats::*;

/// Install a `tracing` subscriber reading `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

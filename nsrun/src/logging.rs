//! Tracing setup, mirroring the teacher's `tracing` + `tracing-subscriber`
//! stack (see `litebox/manager.rs` for the field-structured `tracing::debug!`
//! style this crate follows throughout).

use tracing_subscriber::EnvFilter;

/// Install a stderr-only `fmt` subscriber filtered by `NSRUN_LOG`
/// (default `info`). Safe to call once at process start; re-exec'd `init`
/// children call it again in their own process image.
pub fn init() {
    let filter = EnvFilter::try_from_env("NSRUN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

//! Tracing initialization, shared verbatim by every service and by
//! `agent-cli`, matching the density the teacher workspace's binaries use.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Logs `message` at `error!` and exits the process with status 1. Used for
/// the "startup fails loudly" requirement: an unwritable store path or a
/// missing config section must never be silently tolerated.
pub fn fail_startup(message: impl AsRef<str>) -> ! {
    tracing::error!("{}", message.as_ref());
    std::process::exit(1);
}

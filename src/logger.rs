//! Logging Facade (C13): one-time `tracing` subscriber installation, mirroring
//! `compute_ctl`'s `init_tracing_and_logging(DEFAULT_LOG_LEVEL)` call at the top of `main`.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global `tracing` subscriber. Safe to call at most once per process; `main` is the
/// only caller.
pub fn init_tracing_and_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("building tracing env filter")?;

    let plain_text = std::env::var_os("AGENT_LOG_JSON").is_none();

    if plain_text {
        fmt().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).json().try_init()
    }
    .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

/// Collapse a multi-line string into a single log-friendly line, matching `compute.rs`'s
/// `logger::inlinify` helper used when echoing subprocess output into structured logs.
pub fn inlinify(s: &str) -> String {
    s.lines().collect::<Vec<_>>().join(" \\n ")
}

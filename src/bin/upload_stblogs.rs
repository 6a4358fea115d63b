//! CLI entry point (C15), mirroring `compute_ctl.rs`'s `fn main() -> Result<()>` shape: parse
//! args, install logging, run the invocation, translate its outcome into a process exit code.

use anyhow::{Context, Result};
use upload_stblogs::config::{cli, AgentCliArgs};
use upload_stblogs::logger::{self, DEFAULT_LOG_LEVEL};
use upload_stblogs::{run_invocation, Invocation, EXIT_CONFIG_ERROR};

fn main() -> Result<()> {
    logger::init_tracing_and_logging(DEFAULT_LOG_LEVEL).context("installing tracing subscriber")?;

    let matches = cli().try_get_matches();
    let matches = match matches {
        Ok(m) => m,
        Err(e) => {
            e.print().ok();
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    let args = AgentCliArgs::from_matches(&matches);

    let env = Invocation::default();
    let exit_code = match run_invocation(args, &env) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "configuration error");
            EXIT_CONFIG_ERROR
        }
    };

    std::process::exit(exit_code);
}

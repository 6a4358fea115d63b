//! Device-resident log-upload agent (§1). `run_invocation` is the single entry point: load
//! configuration, build a [`RuntimeContext`], select a strategy, drive it, finalize block markers,
//! and return a process exit code.

pub mod archive;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod finalizer;
pub mod fs_ops;
pub mod logger;
pub mod retry;
pub mod selector;
pub mod session;
pub mod status;
#[cfg(test)]
pub mod test_support;
pub mod telemetry;
pub mod timestamp;
pub mod upload;
pub mod workflow;

use anyhow::Result;
use tracing::{error, info, instrument};

use crate::config::AgentConfig;
use crate::context::{DeviceIdentity, RuntimeContext};
use crate::selector::Strategy;
use crate::session::Session;
use crate::telemetry::TelemetrySink;
use crate::upload::transport::{ReqwestTransport, Transport};
use crate::workflow::{RealSleeper, Sleeper, Workflow, WorkflowEnv};

/// Process exit codes (§7). `0` covers every clean outcome, including PrivacyAbort/NoLogs/no-op;
/// `1` is a failed upload; `2` is reserved for CLI/config parse failures that happen before any
/// strategy is selected.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_UPLOAD_FAILED: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Everything `run_invocation` needs beyond the parsed config: the telemetry sink it should drive
/// and the transport/sleeper the upload pipeline should use. Production callers pass
/// [`NoopTelemetry`](crate::telemetry::NoopTelemetry)/[`ReqwestTransport`]/[`RealSleeper`]; tests
/// substitute fakes from [`test_support`].
pub struct Invocation<'a> {
    pub telemetry: &'a dyn TelemetrySink,
    pub transport: &'a dyn Transport,
    pub sleeper: &'a dyn Sleeper,
}

impl<'a> Default for Invocation<'a> {
    fn default() -> Self {
        static NOOP: crate::telemetry::NoopTelemetry = crate::telemetry::NoopTelemetry;
        static TRANSPORT: ReqwestTransport = ReqwestTransport;
        static SLEEPER: RealSleeper = RealSleeper;
        Invocation { telemetry: &NOOP, transport: &TRANSPORT, sleeper: &SLEEPER }
    }
}

/// Load configuration, select a strategy, run it, finalize, and return the process exit code. The
/// only error this returns is a CLI/config-parse failure (maps to [`EXIT_CONFIG_ERROR`]); every
/// strategy outcome, including upload failure, is reported via the returned exit code rather than
/// an `Err`.
#[instrument(skip_all)]
pub fn run_invocation(args: config::AgentCliArgs, env: &Invocation) -> Result<i32> {
    let config = AgentConfig::load(args)?;
    let identity = DeviceIdentity::new(config.mac_colon.clone(), config.device_type.clone(), config.build_type.clone());
    let ctx = RuntimeContext::new(&config, identity);

    Ok(run_with_context(&ctx, env))
}

/// The part of `run_invocation` that doesn't need a freshly-parsed `AgentConfig`; split out so
/// integration tests can build a [`RuntimeContext`] directly against a tempdir fixture.
pub fn run_with_context(ctx: &RuntimeContext, env: &Invocation) -> i32 {
    let strategy = selector::select_strategy(ctx);
    info!(strategy = strategy.as_str(), "invocation started");

    let exit_code = match strategy {
        Strategy::PrivacyAbort => {
            workflow::run_privacy_abort(env.telemetry);
            EXIT_SUCCESS
        }
        Strategy::NoLogs => {
            workflow::run_no_logs(env.telemetry);
            EXIT_SUCCESS
        }
        Strategy::Rrd => run_rrd(ctx, env),
        _ => run_workflow(ctx, strategy, env),
    };

    info!(exit_code, "invocation finished");
    exit_code
}

fn run_rrd(ctx: &RuntimeContext, env: &Invocation) -> i32 {
    let mut session = Session::new();
    let selection = selector::select_channels(ctx);
    session.primary = selection.primary;
    session.fallback = selection.fallback;

    let workflow_env = WorkflowEnv { telemetry: env.telemetry, transport: env.transport, sleeper: env.sleeper };
    let result = workflow::rrd::run(ctx, &mut session, &workflow_env);

    finalize(ctx, &session);
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, "RRD pass-through failed");
            EXIT_UPLOAD_FAILED
        }
    }
}

fn run_workflow(ctx: &RuntimeContext, strategy: Strategy, env: &Invocation) -> i32 {
    let Some(mut workflow) = Workflow::for_strategy(strategy) else {
        error!(strategy = strategy.as_str(), "strategy has no workflow engine binding");
        return EXIT_UPLOAD_FAILED;
    };

    let mut session = Session::new();
    let selection = selector::select_channels(ctx);
    session.primary = selection.primary;
    session.fallback = selection.fallback;

    let workflow_env = WorkflowEnv { telemetry: env.telemetry, transport: env.transport, sleeper: env.sleeper };
    let result = workflow::run(&mut workflow, ctx, &mut session, &workflow_env);

    finalize(ctx, &session);
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, strategy = strategy.as_str(), "workflow failed");
            EXIT_UPLOAD_FAILED
        }
    }
}

fn finalize(ctx: &RuntimeContext, session: &Session) {
    if let Err(e) = finalizer::finalize(ctx, session, session.archive_name.as_deref()) {
        error!(error = %e, "finalizer failed");
    }
}

//! Strategy Workflow Engine (C7): drives the four deterministic phases — setup, archive, upload,
//! cleanup — for whichever [`Workflow`] the selector picked, guaranteeing cleanup always runs.
//! Grounded on the "function-pointer strategy table" redesign note in SPEC_FULL.md §9: a single
//! enum over the closed set of workflow bodies, dispatched the way `ComputeMode` is dispatched in
//! `compute_api::spec`, rather than a table of function pointers or a trait object per strategy.

pub mod dcm;
pub mod ondemand;
pub mod reboot;
pub mod rrd;

use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument};

use crate::context::RuntimeContext;
use crate::selector::Strategy;
use crate::session::Session;
use crate::telemetry::{names, TelemetrySink};
use crate::upload::transport::Transport;

/// The three explicit sleeps in §5's suspension-point list, made an injectable seam so unit tests
/// exercise the Reboot/DCM phase bodies without paying their wall-clock cost. Production wiring
/// uses [`RealSleeper`]; tests use a no-op that only records requested durations.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Everything a phase body needs beyond `(ctx, session)`: the telemetry sink, the transport used
/// by the upload pipeline, and the sleeper seam. Bundled so phase signatures stay at the
/// `(ctx, session, env)` shape SPEC_FULL.md §4.2 describes, rather than growing a parameter per
/// collaborator.
pub struct WorkflowEnv<'a> {
    pub telemetry: &'a dyn TelemetrySink,
    pub transport: &'a dyn Transport,
    pub sleeper: &'a dyn Sleeper,
}

/// One workflow body per non-trivial strategy. RRD, PrivacyAbort, and NoLogs bypass this engine
/// entirely (§4.2.4) and are driven directly by [`crate::run_invocation`].
pub enum Workflow {
    OnDemand(ondemand::OnDemandWorkflow),
    Reboot(reboot::RebootWorkflow),
    Dcm(dcm::DcmWorkflow),
}

impl Workflow {
    /// `None` for the three strategies that don't use the four-phase engine.
    pub fn for_strategy(strategy: Strategy) -> Option<Workflow> {
        match strategy {
            Strategy::OnDemand => Some(Workflow::OnDemand(ondemand::OnDemandWorkflow::default())),
            Strategy::Reboot | Strategy::NonDcm => Some(Workflow::Reboot(reboot::RebootWorkflow::default())),
            Strategy::Dcm => Some(Workflow::Dcm(dcm::DcmWorkflow::default())),
            Strategy::Rrd | Strategy::PrivacyAbort | Strategy::NoLogs => None,
        }
    }

    fn setup(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        match self {
            Workflow::OnDemand(w) => w.setup(ctx, session, env),
            Workflow::Reboot(w) => w.setup(ctx, session, env),
            Workflow::Dcm(w) => w.setup(ctx, session, env),
        }
    }

    fn archive(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        match self {
            Workflow::OnDemand(w) => w.archive(ctx, session, env),
            Workflow::Reboot(w) => w.archive(ctx, session, env),
            Workflow::Dcm(w) => w.archive(ctx, session, env),
        }
    }

    fn upload(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        match self {
            Workflow::OnDemand(w) => w.upload(ctx, session, env),
            Workflow::Reboot(w) => w.upload(ctx, session, env),
            Workflow::Dcm(w) => w.upload(ctx, session, env),
        }
    }

    fn cleanup(&mut self, ctx: &RuntimeContext, session: &mut Session, upload_succeeded: bool, env: &WorkflowEnv) -> Result<()> {
        match self {
            Workflow::OnDemand(w) => w.cleanup(ctx, session, upload_succeeded, env),
            Workflow::Reboot(w) => w.cleanup(ctx, session, upload_succeeded, env),
            Workflow::Dcm(w) => w.cleanup(ctx, session, upload_succeeded, env),
        }
    }
}

/// The engine driver: setup → archive → upload → cleanup, in order. If setup or archive fails,
/// later phases are skipped *except* cleanup, which always runs with `upload_succeeded = false`
/// in that case. The returned `Result` preserves the first failure encountered, even across a
/// cleanup that itself succeeds (§4.2).
#[instrument(skip_all)]
pub fn run(workflow: &mut Workflow, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
    let setup_result = workflow.setup(ctx, session, env);

    let archive_result = if setup_result.is_ok() {
        workflow.archive(ctx, session, env)
    } else {
        Ok(())
    };

    let upload_result = if setup_result.is_ok() && archive_result.is_ok() {
        workflow.upload(ctx, session, env)
    } else {
        Ok(())
    };

    let upload_succeeded = setup_result.is_ok() && archive_result.is_ok() && upload_result.is_ok() && session.success;
    let cleanup_result = workflow.cleanup(ctx, session, upload_succeeded, env);

    setup_result.and(archive_result).and(upload_result).and(cleanup_result)
}

/// §4.2.4: PrivacyAbort terminates cleanly after emitting telemetry; no filesystem mutation.
#[instrument(skip_all)]
pub fn run_privacy_abort(telemetry: &dyn TelemetrySink) {
    telemetry.count(names::PRIVACY_ABORT);
    info!("privacy opt-out is set; aborting upload cleanly");
}

/// §4.2.4: NoLogs terminates cleanly after emitting telemetry; no filesystem mutation.
#[instrument(skip_all)]
pub fn run_no_logs(telemetry: &dyn TelemetrySink) {
    telemetry.count(names::NO_LOGS_REBOOT);
    info!("previous-boot directory has no matching log files; nothing to upload");
}

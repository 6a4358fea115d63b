//! RRD ("Remote Debug") pass-through path (§4.2.4). Bypasses the four-phase engine entirely: no
//! setup/archive/cleanup, just a single upload of a pre-built archive this agent never produces
//! itself. Retry/fallback still applies per channel via [`crate::retry`].

use anyhow::{bail, Context, Result};
use tracing::instrument;

use crate::context::RuntimeContext;
use crate::error::AgentError;
use crate::retry;
use crate::session::Session;
use crate::workflow::WorkflowEnv;

#[instrument(skip_all)]
pub fn run(ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
    if !ctx.paths.rrd_archive_path.exists() {
        bail!(AgentError::FilesystemMissing {
            path: ctx.paths.rrd_archive_path.clone().into_std_path_buf(),
            detail: "RRD archive not present; nothing to upload".into(),
        });
    }
    session.archive_name = Some(ctx.paths.rrd_archive_path.clone());

    retry::upload_with_retry_and_fallback(ctx, session, &ctx.paths.rrd_archive_path, env.telemetry, env.transport)
        .context("RRD pass-through upload failed")?;

    if !session.success {
        bail!(AgentError::HttpRetryable {
            status: session.direct.last_http_status.max(session.codebig.last_http_status)
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Channel;
    use crate::test_support::{base_ctx, RecordingTelemetry, ScriptedCall, ScriptedTransport};
    use camino_tempfile::tempdir;

    #[test]
    fn fails_when_archive_absent() {
        let tmp = tempdir().unwrap();
        let ctx = base_ctx(tmp.path());
        let mut session = Session::new();
        let telemetry = RecordingTelemetry::default();
        let transport = ScriptedTransport::new(vec![]);
        let sleeper = crate::workflow::RealSleeper;
        let env = WorkflowEnv { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };
        assert!(run(&ctx, &mut session, &env).is_err());
    }

    #[test]
    fn uploads_existing_archive_once() {
        let tmp = tempdir().unwrap();
        let ctx = base_ctx(tmp.path());
        std::fs::write(ctx.paths.rrd_archive_path.as_std_path(), b"rrd archive bytes").unwrap();

        let mut session = Session::new();
        session.primary = Some(Channel::Direct);
        session.fallback = Some(Channel::CodeBig);

        let transport = ScriptedTransport::new(vec![
            ScriptedCall::Post { http_status: 200, transport_code: 0, body: "https://s3.example/rrd?sig=1" },
            ScriptedCall::Put { http_status: 200, transport_code: 0 },
        ]);
        let telemetry = RecordingTelemetry::default();
        let sleeper = crate::workflow::RealSleeper;
        let env = WorkflowEnv { telemetry: &telemetry, transport: &transport, sleeper: &sleeper };

        run(&ctx, &mut session, &env).unwrap();
        assert!(session.success);
        assert!(ctx.paths.rrd_archive_path.exists(), "RRD archive is externally owned; this path must not delete it");
    }
}

//! Dcm workflow body (§4.2.3): the device-configuration-management batch path, selected whenever
//! `dcm_flag` is set and the Reboot eligibility condition (`upload_on_reboot && flag`) is not.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing::info;

use crate::archive::{self, ArchiveKind};
use crate::collector;
use crate::context::RuntimeContext;
use crate::error::AgentError;
use crate::fs_ops;
use crate::retry;
use crate::session::Session;
use crate::timestamp::TimestampMarker;
use crate::workflow::WorkflowEnv;

const POST_ARCHIVE_SETTLE: Duration = Duration::from_secs(60);
const SETTINGS_UPLOAD_LINE: &str = r#"urn:settings:LogUploadSettings:upload="true""#;

#[derive(Default)]
pub struct DcmWorkflow {
    marker: TimestampMarker,
}

impl DcmWorkflow {
    pub fn setup(&mut self, ctx: &RuntimeContext, _session: &mut Session, _env: &WorkflowEnv) -> Result<()> {
        if !ctx.paths.dcm_batch_dir.exists() {
            bail!(AgentError::FilesystemMissing {
                path: ctx.paths.dcm_batch_dir.clone().into_std_path_buf(),
                detail: "DCM batch directory does not exist".into(),
            });
        }

        let settings = std::fs::read_to_string(ctx.sidecars.dcm_settings_file.as_std_path()).unwrap_or_default();
        if !settings.contains(SETTINGS_UPLOAD_LINE) {
            bail!(AgentError::Config(
                "DCM log-upload settings line absent or disabled; skipping this run".into()
            ));
        }

        self.marker.mark(&ctx.paths.dcm_batch_dir, Local::now(), &[])?;
        Ok(())
    }

    pub fn archive(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if ctx.settings.include_pcap {
            collector::collect_most_recent_pcap(&ctx.paths.main_log_dir, &ctx.paths.dcm_batch_dir)?;
        }
        let filename = archive::archive_filename(&ctx.identity.mac_compact, ArchiveKind::Logs, Local::now());
        let archive_path = archive::build_archive(&ctx.paths.dcm_batch_dir, &ctx.paths.main_log_dir, &filename)?;
        session.archive_name = Some(archive_path);
        env.sleeper.sleep(POST_ARCHIVE_SETTLE);
        Ok(())
    }

    pub fn upload(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        let archive_path = session.archive_name.clone().context("archive phase did not record an archive path")?;
        retry::upload_with_retry_and_fallback(ctx, session, &archive_path, env.telemetry, env.transport)?;

        if ctx.settings.include_pcap {
            collector::purge_pcaps(&ctx.paths.main_log_dir)?;
        }

        if !session.success {
            bail!(AgentError::HttpRetryable {
                status: session.direct.last_http_status.max(session.codebig.last_http_status)
            });
        }
        Ok(())
    }

    /// Always deletes the DCM batch dir, whether upload succeeded or not (§4.2.3).
    pub fn cleanup(&mut self, ctx: &RuntimeContext, session: &mut Session, _upload_succeeded: bool, _env: &WorkflowEnv) -> Result<()> {
        if let Some(archive_path) = session.archive_name.take() {
            std::fs::remove_file(archive_path.as_std_path()).ok();
        }
        info!(dir = %ctx.paths.dcm_batch_dir, "deleting DCM batch directory");
        fs_ops::remove_dir_if_exists(&ctx.paths.dcm_batch_dir)
    }
}

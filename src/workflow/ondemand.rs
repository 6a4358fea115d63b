//! OnDemand workflow body (§4.2.1): the interactively-triggered "UploadLogsNow" path, the only
//! strategy with a status sidecar consumer waiting on the result.

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use chrono::Local;
use tracing::{info, instrument};

use crate::archive::{self, ArchiveKind};
use crate::context::RuntimeContext;
use crate::error::AgentError;
use crate::fs_ops;
use crate::retry;
use crate::session::Session;
use crate::status::{self, UploadStatus};
use crate::telemetry::names;
use crate::workflow::WorkflowEnv;

const ONDEMAND_TEMP_DIRNAME: &str = "log_on_demand";

#[derive(Debug, Default)]
pub struct OnDemandWorkflow {
    working_dir: Option<Utf8PathBuf>,
}

impl OnDemandWorkflow {
    #[instrument(skip_all)]
    pub fn setup(&mut self, ctx: &RuntimeContext, _session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if !fs_ops::has_log_files(&ctx.paths.main_log_dir) {
            env.telemetry.count(names::NO_LOGS_ON_DEMAND);
            status::write_status(&ctx.sidecars.ondemand_status_sidecar, UploadStatus::Failed).ok();
            bail!(AgentError::FilesystemMissing {
                path: ctx.paths.main_log_dir.clone().into_std_path_buf(),
                detail: "no *.txt/*.log files present for on-demand upload".into(),
            });
        }
        status::write_status(&ctx.sidecars.ondemand_status_sidecar, UploadStatus::Triggered)?;

        let working_dir = ctx.paths.temp_dir.join(ONDEMAND_TEMP_DIRNAME);
        fs_ops::purge_and_recreate_dir(&working_dir)?;
        let copied = fs_ops::copy_matching_files(&ctx.paths.main_log_dir, &working_dir, &["*.txt*", "*.log*"])?;

        // Audit trail of where each collected file will ultimately live once uploaded.
        let journal_path = ctx.paths.temp_dir.join("lastlog_path");
        let mut journal = String::new();
        for file in &copied {
            journal.push_str(file.as_str());
            journal.push('\n');
        }
        std::fs::write(journal_path.as_std_path(), journal).context("writing lastlog_path journal")?;

        self.working_dir = Some(working_dir);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn archive(&mut self, ctx: &RuntimeContext, session: &mut Session, _env: &WorkflowEnv) -> Result<()> {
        let source_dir = self
            .working_dir
            .clone()
            .context("on-demand setup did not record a working directory")?;
        let filename = archive::archive_filename(&ctx.identity.mac_compact, ArchiveKind::Logs, Local::now());
        let archive_path = archive::build_archive(&source_dir, &ctx.paths.temp_dir, &filename)?;
        session.archive_name = Some(archive_path);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn upload(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if !ctx.flags.flag {
            info!("global flag is false; skipping on-demand upload");
            return Ok(());
        }
        status::write_status(&ctx.sidecars.ondemand_status_sidecar, UploadStatus::InProgress)?;
        let archive_path = session.archive_name.clone().context("archive phase did not record an archive path")?;
        retry::upload_with_retry_and_fallback(ctx, session, &archive_path, env.telemetry, env.transport)?;

        let final_status = if session.success { UploadStatus::Complete } else { UploadStatus::Failed };
        status::write_status(&ctx.sidecars.ondemand_status_sidecar, final_status)?;

        if !session.success {
            bail!(AgentError::HttpRetryable {
                status: session.direct.last_http_status.max(session.codebig.last_http_status)
            });
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn cleanup(&mut self, ctx: &RuntimeContext, _session: &mut Session, _upload_succeeded: bool, _env: &WorkflowEnv) -> Result<()> {
        let working_dir = ctx.paths.temp_dir.join(ONDEMAND_TEMP_DIRNAME);
        fs_ops::remove_dir_if_exists(&working_dir)?;
        Ok(())
    }
}

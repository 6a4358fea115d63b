//! Reboot / NonDcm workflow body (§4.2.2). The two strategies share this exact body: NonDcm is
//! selected whenever `dcm_flag == 0` (step 5 of the selector cascade), Reboot whenever
//! `dcm_flag && upload_on_reboot && flag` (step 6); both read the same `ctx.flags` the upload
//! eligibility rule already branches on, so no extra tag is needed to tell them apart here.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::archive::{self, ArchiveKind};
use crate::collector;
use crate::context::RuntimeContext;
use crate::error::AgentError;
use crate::fs_ops;
use crate::retry;
use crate::session::Session;
use crate::telemetry::names;
use crate::timestamp::TimestampMarker;
use crate::workflow::WorkflowEnv;

const UPTIME_QUIESCE_THRESHOLD: Duration = Duration::from_secs(900);
const UPTIME_QUIESCE_SLEEP: Duration = Duration::from_secs(330);
const POST_ARCHIVE_SETTLE: Duration = Duration::from_secs(60);
const PRE_CLEANUP_SETTLE: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct RebootWorkflow {
    marker: TimestampMarker,
    marked: bool,
}

impl RebootWorkflow {
    #[instrument(skip_all)]
    pub fn setup(&mut self, ctx: &RuntimeContext, _session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if !fs_ops::has_log_files(&ctx.paths.previous_boot_log_dir) {
            env.telemetry.count(names::NO_LOGS_REBOOT);
            bail!(AgentError::FilesystemMissing {
                path: ctx.paths.previous_boot_log_dir.clone().into_std_path_buf(),
                detail: "no *.txt/*.log files present in previous-boot dir".into(),
            });
        }

        let uptime = ctx.uptime_override.unwrap_or_else(system_uptime);
        if uptime < UPTIME_QUIESCE_THRESHOLD {
            info!(sleep_secs = UPTIME_QUIESCE_SLEEP.as_secs(), "system recently booted; quiescing");
            env.sleeper.sleep(UPTIME_QUIESCE_SLEEP);
        }

        collector::sweep_stale_backups(&ctx.paths.main_log_dir)?;

        self.marker.mark(&ctx.paths.previous_boot_log_dir, Local::now(), &[])?;
        self.marked = true;
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn archive(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if ctx.settings.include_pcap {
            collector::collect_most_recent_pcap(&ctx.paths.main_log_dir, &ctx.paths.previous_boot_log_dir)?;
        }
        let filename = archive::archive_filename(&ctx.identity.mac_compact, ArchiveKind::Logs, Local::now());
        let archive_path = archive::build_archive(&ctx.paths.previous_boot_log_dir, &ctx.paths.main_log_dir, &filename)?;
        session.archive_name = Some(archive_path);
        env.sleeper.sleep(POST_ARCHIVE_SETTLE);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn upload(&mut self, ctx: &RuntimeContext, session: &mut Session, env: &WorkflowEnv) -> Result<()> {
        if !reboot_upload_eligible(ctx) {
            info!("reboot upload not eligible per §4.2.2 eligibility rule");
            return Ok(());
        }

        let archive_path = session.archive_name.clone().context("archive phase did not record an archive path")?;
        retry::upload_with_retry_and_fallback(ctx, session, &archive_path, env.telemetry, env.transport)?;

        if ctx.settings.include_dri && ctx.paths.dri_log_dir.exists() {
            self.upload_dri(ctx, session, env);
        }

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

    /// A fresh [`Session`] with reset attempt counters, as required by §4.2.2: DRI telemetry is
    /// emitted regardless of outcome, and a DRI failure does not fail the overall upload (the
    /// main archive's outcome already decided that).
    fn upload_dri(&mut self, ctx: &RuntimeContext, session: &Session, env: &WorkflowEnv) {
        let mut dri_session = Session::new();
        dri_session.primary = session.primary;
        dri_session.fallback = session.fallback;

        let filename = archive::archive_filename(&ctx.identity.mac_compact, ArchiveKind::DriLogs, Local::now());
        let result = archive::build_archive(&ctx.paths.dri_log_dir, &ctx.paths.main_log_dir, &filename).and_then(|dri_archive| {
            retry::upload_with_retry_and_fallback(ctx, &mut dri_session, &dri_archive, env.telemetry, env.transport)
                .map(|_| dri_archive)
        });

        env.telemetry.count(names::DRI_LOG_UPLOAD);
        match result {
            Ok(dri_archive) => {
                if dri_session.success {
                    std::fs::remove_file(dri_archive.as_std_path()).ok();
                } else {
                    warn!(%dri_archive, "DRI archive upload failed; leaving archive in place");
                }
            }
            Err(e) => warn!(error = %e, "building/uploading DRI archive failed"),
        }
    }

    #[instrument(skip_all)]
    pub fn cleanup(&mut self, ctx: &RuntimeContext, session: &mut Session, _upload_succeeded: bool, env: &WorkflowEnv) -> Result<()> {
        env.sleeper.sleep(PRE_CLEANUP_SETTLE);

        if let Some(archive_path) = session.archive_name.take() {
            std::fs::remove_file(archive_path.as_std_path()).ok();
        }

        if self.marked {
            self.marker.unmark(&ctx.paths.previous_boot_log_dir)?;
        }

        let backup_dir = ctx.paths.main_log_dir.join(format!("{}-logbackup", archive::format_stamp(Local::now())));
        fs_ops::purge_and_recreate_dir(&backup_dir)?;
        fs_ops::move_all_files(&ctx.paths.previous_boot_log_dir, &backup_dir)?;
        fs_ops::remove_dir_if_exists(&ctx.paths.previous_boot_log_dir)?;
        std::fs::create_dir_all(ctx.paths.previous_boot_log_dir.as_std_path())
            .context("recreating previous-boot directory")?;
        fs_ops::purge_and_recreate_dir(&ctx.paths.previous_boot_backup_dir)?;

        // §4.2.2's literal text: "if in DCM-with-upload_on_reboot==false mode". Under the
        // selector cascade this workflow only ever runs with `dcm_flag == 0` (NonDcm) or
        // `dcm_flag && upload_on_reboot && flag` (Reboot), so this condition is unreachable today;
        // kept verbatim in case a future selector change (e.g. a forced-reboot CLI override)
        // routes here with `dcm_flag` set and `upload_on_reboot` false.
        if ctx.flags.dcm_flag && !ctx.flags.upload_on_reboot {
            append_dcm_batch_entry(ctx, &backup_dir)?;
        }

        Ok(())
    }
}

fn append_dcm_batch_entry(ctx: &RuntimeContext, backup_dir: &Utf8Path) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(ctx.sidecars.dcm_batch_list.as_std_path())
        .context("opening DCM batch list")?;
    writeln!(file, "{backup_dir}").context("appending to DCM batch list")?;
    Ok(())
}

/// §4.2.2 upload eligibility: the first true rule decides.
fn reboot_upload_eligible(ctx: &RuntimeContext) -> bool {
    if !ctx.flags.dcm_flag {
        return true; // rule (a)
    }
    if ctx.flags.upload_on_reboot {
        return true; // rule (b)
    }
    if ctx.settings.upload_logs_on_unscheduled_reboot_disabled {
        return false;
    }
    let reason = std::fs::read_to_string(ctx.sidecars.reboot_reason_file.as_std_path()).unwrap_or_default();
    !reason.contains("Scheduled Reboot") && !reason.contains("MAINTENANCE_REBOOT") // rule (c)
}

fn system_uptime() -> Duration {
    std::fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|s| s.split_whitespace().next().map(str::to_string))
        .and_then(|s| s.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .unwrap_or(UPTIME_QUIESCE_THRESHOLD)
}

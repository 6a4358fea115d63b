//! Status sidecar (C3.2, ambient supplement): the `/opt/loguploadstatus.txt` contract consumed by
//! external tooling polling an OnDemand ("UploadLogsNow") upload's progress, grounded on
//! `uploadstblogs/include/uploadlogsnow.h`.

use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Triggered,
    InProgress,
    Complete,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Triggered => "Triggered",
            UploadStatus::InProgress => "In progress",
            UploadStatus::Complete => "Complete",
            UploadStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Write `status` plus the current local time to `path`. Used only by the OnDemand workflow, the
/// one strategy with an interactive trigger and a consumer waiting on the result (§3.2).
pub fn write_status(path: &Utf8Path, status: UploadStatus) -> Result<()> {
    let now = Local::now().to_rfc3339();
    fs::write(path, format!("{status}\n{now}\n")).with_context(|| format!("writing status sidecar {path}"))
}

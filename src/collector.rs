//! Log Collector (C4): filter + gather logs from source directories, and age-sweep stale PCAPs
//! and permanent-backup directories. Grounded on the original `log_collector.c` filter contract.

use std::time::Duration;

use anyhow::Result;
use camino::Utf8Path;

use crate::fs_ops;

const BACKUP_DIR_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 3600);
const BACKUP_DIR_PATTERN: &str = "*-*-*-*-*M-*";

/// Age-sweep permanent-backup directories in `main_log_dir` older than 3 days (§4.2.2 setup).
pub fn sweep_stale_backups(main_log_dir: &Utf8Path) -> Result<usize> {
    fs_ops::age_sweep(main_log_dir, BACKUP_DIR_PATTERN, BACKUP_DIR_MAX_AGE)
}

/// Copy the single most-recently-modified `.pcap` from `main_log_dir` into `dest_dir`, if any
/// exists and the caller's `include_pcap` setting is on. Returns whether a file was copied.
pub fn collect_most_recent_pcap(main_log_dir: &Utf8Path, dest_dir: &Utf8Path) -> Result<bool> {
    let Some(pcap) = fs_ops::most_recent_matching(main_log_dir, "*.pcap")? else {
        return Ok(false);
    };
    let dest = dest_dir.join(pcap.file_name().expect("pcap path has a filename"));
    std::fs::copy(&pcap, &dest)?;
    Ok(true)
}

/// Delete every `.pcap` file directly inside `main_log_dir` (post-upload purge, §4.2.2/§4.2.3).
pub fn purge_pcaps(main_log_dir: &Utf8Path) -> Result<usize> {
    let mut removed = 0;
    for pcap in fs_ops::list_matching_files(main_log_dir, &["*.pcap"])? {
        std::fs::remove_file(&pcap)?;
        removed += 1;
    }
    Ok(removed)
}

//! Timestamp Marker (C5): atomically rename every regular file in a directory with a time prefix
//! before upload, and reverse the rename afterward. Grounded on the original `path_handler.c`
//! mark/unmark contract (SPEC_FULL.md §4.3).

use std::fs;

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;

static LEGACY_STAMP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{2}-\d{2}-\d{2}(AM|PM)-").unwrap());

/// Names excluded from marking in the OnDemand ("UploadLogsNow") path only (§9 Open Question 2).
pub const ONDEMAND_SKIP_LIST: &[&str] = &["reboot.log", "ABLReason.txt"];

#[derive(Debug, Default)]
pub struct TimestampMarker {
    /// The exact stamp produced by the last `mark` call, remembered in process memory only
    /// (never persisted across invocations, per §4.3).
    last_stamp: Option<String>,
}

impl TimestampMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename every regular file in `dir` not already starting with the computed stamp (and, if
    /// `skip_list` is non-empty, not named exactly one of its entries) to `<stamp><name>`.
    pub fn mark(&mut self, dir: &Utf8Path, now: DateTime<Local>, skip_list: &[&str]) -> Result<String> {
        let stamp = format!("{}-", crate::archive::format_stamp(now));
        let entries = fs::read_dir(dir).with_context(|| format!("reading directory {dir}"))?;
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&stamp) || skip_list.contains(&name.as_str()) {
                continue;
            }
            let new_path = dir.join(format!("{stamp}{name}"));
            fs::rename(entry.path(), &new_path)
                .with_context(|| format!("marking {:?} -> {new_path}", entry.path()))?;
        }
        self.last_stamp = Some(stamp.clone());
        Ok(stamp)
    }

    /// Reverse `mark`: strip the remembered stamp (or, if this process never marked anything,
    /// pattern-detect an `NN-NN-NN-NN-NN{AM|PM}-` prefix and strip it) from every matching file.
    pub fn unmark(&self, dir: &Utf8Path) -> Result<usize> {
        let entries = fs::read_dir(dir).with_context(|| format!("reading directory {dir}"))?;
        let mut unmarked = 0;
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let stripped = match &self.last_stamp {
                Some(stamp) if name.starts_with(stamp.as_str()) => Some(name[stamp.len()..].to_string()),
                Some(_) => None,
                None => LEGACY_STAMP_PATTERN
                    .find(&name)
                    .map(|m| name[m.end()..].to_string()),
            };
            if let Some(original) = stripped {
                let new_path = dir.join(&original);
                fs::rename(entry.path(), &new_path)
                    .with_context(|| format!("unmarking {:?} -> {new_path}", entry.path()))?;
                unmarked += 1;
            }
        }
        Ok(unmarked)
    }
}

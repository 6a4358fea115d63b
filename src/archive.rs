//! Archive Builder (C3): gzip-compressed tar of a directory, named
//! `<MAC-without-colons>_<Kind>_<MM-DD-YY-HH-MMAM/PM>.tgz` (§6). Grounded on `compute.rs`'s
//! basebackup tar/gzip handling, which runs the same pairing (`tar` + `flate2`) in the decode
//! direction; here we run it in the encode direction.

use std::fs::File;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Logs,
    DriLogs,
}

impl ArchiveKind {
    fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Logs => "Logs",
            ArchiveKind::DriLogs => "DRI_Logs",
        }
    }
}

/// `MM-DD-YY-HH-MMAM/PM`, matching the timestamp-marker stamp format (§4.3) and the archive
/// filename format (§6). `now` is local time, as specified.
pub fn format_stamp(now: DateTime<Local>) -> String {
    now.format("%m-%d-%y-%I-%M%p").to_string()
}

/// Build the archive filename for `(mac, kind, now)`. Stable within the same minute; ≤ 64 chars
/// for any reasonable MAC/kind combination (§9's testable assertion).
pub fn archive_filename(mac_compact: &str, kind: ArchiveKind, now: DateTime<Local>) -> String {
    format!("{mac_compact}_{}_{}.tgz", kind.as_str(), format_stamp(now))
}

/// Build a `.tgz` of every regular file directly inside `source_dir`, writing it to
/// `dest_dir/<filename>`. Returns the full path to the archive.
pub fn build_archive(source_dir: &Utf8Path, dest_dir: &Utf8Path, filename: &str) -> Result<Utf8PathBuf> {
    let archive_path = dest_dir.join(filename);
    let file = File::create(&archive_path)
        .with_context(|| format!("creating archive file {archive_path}"))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", source_dir)
        .with_context(|| format!("archiving {source_dir} into {archive_path}"))?;
    builder.into_inner().context("finishing tar stream")?.finish().context("finishing gzip stream")?;
    Ok(archive_path)
}

//! Filesystem Primitives (C2): directory walk, move, copy, rename, recursive remove, and
//! path-pattern age sweep. These are the mechanical adapters SPEC_FULL.md §1 calls out as
//! deliberately out of scope for bespoke algorithmic design; what's specified here is the
//! *contract* each helper must uphold, grounded on `file_operations.c`/`path_handler.c`.

use std::fs;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// True if `dir` exists and contains at least one regular file whose name ends with `.txt` or
/// `.log` (the predicate used by the strategy selector's NoLogs checks, §4.1).
pub fn has_log_files(dir: &Utf8Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            && matches_any_suffix(&entry.file_name().to_string_lossy(), &[".txt", ".log"])
    })
}

fn matches_any_suffix(name: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| name.ends_with(suffix))
}

/// List the regular files directly inside `dir` whose name matches one of `patterns` (simple
/// glob-like suffix/prefix fragments such as `.pcap`, `*.txt*`, `*.log*`).
pub fn list_matching_files(dir: &Utf8Path, patterns: &[&str]) -> Result<Vec<Utf8PathBuf>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("reading directory {dir}"))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if patterns.iter().any(|p| glob_fragment_matches(&name, p)) {
            out.push(Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| anyhow::anyhow!("non-utf8 path: {p:?}"))?);
        }
    }
    Ok(out)
}

/// Minimal glob support for patterns built from literal fragments separated by `*`, e.g.
/// `*.txt*`, `.pcap`, or the multi-wildcard backup-directory pattern `*-*-*-*-*M-*`. A leading/
/// trailing `*` means the pattern is unanchored on that side; fragments must otherwise occur in
/// `name` in order.
fn glob_fragment_matches(name: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return name == pattern;
    }
    let anchored_start = !pattern.starts_with('*');
    let anchored_end = !pattern.ends_with('*');
    let fragments: Vec<&str> = pattern.split('*').filter(|f| !f.is_empty()).collect();
    if fragments.is_empty() {
        return true;
    }

    let mut pos = 0;
    for (i, fragment) in fragments.iter().enumerate() {
        if i == 0 && anchored_start {
            if !name[pos..].starts_with(fragment) {
                return false;
            }
            pos += fragment.len();
        } else {
            match name[pos..].find(fragment) {
                Some(offset) => pos += offset + fragment.len(),
                None => return false,
            }
        }
    }
    !anchored_end || name.ends_with(fragments.last().unwrap())
}

/// Recreate `dir` from scratch: remove it (recursively) if present, then create it (and parents).
pub fn purge_and_recreate_dir(dir: &Utf8Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("removing directory {dir}"))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("creating directory {dir}"))?;
    Ok(())
}

/// Copy every regular file in `src` matching any of `patterns` into `dst`, which must already
/// exist. Returns the destination paths, in directory-iteration order.
pub fn copy_matching_files(src: &Utf8Path, dst: &Utf8Path, patterns: &[&str]) -> Result<Vec<Utf8PathBuf>> {
    let mut copied = Vec::new();
    for file in list_matching_files(src, patterns)? {
        let dest = dst.join(file.file_name().expect("list_matching_files yields files"));
        fs::copy(&file, &dest).with_context(|| format!("copying {file} -> {dest}"))?;
        copied.push(dest);
    }
    Ok(copied)
}

/// Move every regular file directly inside `src` into `dst`, which must already exist. Used by
/// Reboot cleanup to drain the previous-boot dir into its permanent backup (§4.2.2).
pub fn move_all_files(src: &Utf8Path, dst: &Utf8Path) -> Result<usize> {
    let mut moved = 0;
    let entries = fs::read_dir(src).with_context(|| format!("reading directory {src}"))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let dest = dst.join(entry.file_name().to_string_lossy().to_string());
        fs::rename(entry.path(), &dest)
            .with_context(|| format!("moving {:?} -> {dest}", entry.path()))?;
        moved += 1;
    }
    Ok(moved)
}

/// Remove `dir` and everything in it, if present. Idempotent.
pub fn remove_dir_if_exists(dir: &Utf8Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("removing directory {dir}"))?;
    }
    Ok(())
}

/// Age-sweep entries directly inside `dir` whose name matches `name_pattern` and whose mtime is
/// older than `max_age`. Used for the `*-*-*-*-*M-*` backup-directory sweep and stale-PCAP purge.
pub fn age_sweep(dir: &Utf8Path, name_pattern: &str, max_age: Duration) -> Result<usize> {
    let mut removed = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(0);
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !glob_fragment_matches(&name, name_pattern) {
            continue;
        }
        let meta = entry.metadata()?;
        let age = now
            .duration_since(meta.modified()?)
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }
        let path = entry.path();
        if meta.is_dir() {
            fs::remove_dir_all(&path).with_context(|| format!("age-sweeping {path:?}"))?;
        } else {
            fs::remove_file(&path).with_context(|| format!("age-sweeping {path:?}"))?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// The single most-recently-modified file in `dir` matching `pattern`, if any (§4.2.2's PCAP
/// selection rule).
pub fn most_recent_matching(dir: &Utf8Path, pattern: &str) -> Result<Option<Utf8PathBuf>> {
    let mut best: Option<(Utf8PathBuf, SystemTime)> = None;
    for file in list_matching_files(dir, &[pattern])? {
        let modified = fs::metadata(&file)?.modified()?;
        if best.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
            best = Some((file, modified));
        }
    }
    Ok(best.map(|(p, _)| p))
}

/// Touch `path`'s mtime to "now", creating it as an empty file if absent. Used for block markers.
pub fn touch_now(path: &Utf8Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    fs::File::create(path).with_context(|| format!("touching {path}"))?;
    Ok(())
}

/// How long ago `path`'s mtime was, or `None` if the path doesn't exist.
pub fn age_of(path: &Utf8Path) -> Result<Option<Duration>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let age = SystemTime::now()
                .duration_since(meta.modified()?)
                .unwrap_or(Duration::ZERO);
            Ok(Some(age))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("reading metadata"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;

    #[test]
    fn has_log_files_detects_txt_and_log() {
        let dir = tempdir().unwrap();
        assert!(!has_log_files(dir.path()));
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        assert!(has_log_files(dir.path()));
    }

    #[test]
    fn purge_and_recreate_clears_contents() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stale.txt"), b"x").unwrap();
        purge_and_recreate_dir(dir.path()).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn move_all_files_drains_source() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.log"), b"1").unwrap();
        fs::write(src.path().join("b.log"), b"2").unwrap();
        let moved = move_all_files(src.path(), dst.path()).unwrap();
        assert_eq!(moved, 2);
        assert_eq!(fs::read_dir(src.path()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 2);
    }

    #[test]
    fn most_recent_matching_picks_newest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.pcap"), b"1").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("new.pcap"), b"2").unwrap();
        let newest = most_recent_matching(dir.path(), "*.pcap").unwrap().unwrap();
        assert_eq!(newest.file_name().unwrap(), "new.pcap");
    }

    #[test]
    fn glob_fragment_matches_multi_wildcard_backup_dir_pattern() {
        assert!(glob_fragment_matches("07-30-26-02-05PM-logbackup", "*-*-*-*-*M-*"));
        assert!(!glob_fragment_matches("logbackup", "*-*-*-*-*M-*"));
        assert!(!glob_fragment_matches("07-30-26-02-05AM-logbackup", "*-*-*-*-*M-*"));
    }

    #[test]
    fn age_sweep_removes_aged_multi_wildcard_backup_dirs() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("07-30-26-02-05PM-logbackup");
        fs::create_dir(&stale).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let cutoff = Duration::from_millis(10);
        let fresh = dir.path().join("07-31-26-09-00AM-logbackup");
        fs::create_dir(&fresh).unwrap();

        let removed = age_sweep(dir.path(), "*-*-*-*-*M-*", cutoff).unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}

//! On-disk layout: `<root>/YYYY/MM/DD/<timestamp>_<id>.json`.
//!
//! A day directory is the unit of retention. Files inside it are
//! newline-delimited records and are only ever opened in append mode.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use trustverify_contracts::record::iso_millis;

/// Chain state file kept at the storage root.
pub const CHAIN_STATE_FILE: &str = ".chain-state.json";

/// `<root>/YYYY/MM/DD` for `date`.
pub fn day_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

/// `2026-03-14T09-30-00.123Z_<id>.json`: the ISO timestamp with `:`
/// replaced by `-` so the name is portable.
pub fn record_file_name(timestamp: &DateTime<Utc>, id: &str) -> String {
    format!("{}_{}.json", iso_millis::format(timestamp).replace(':', "-"), id)
}

/// Every date from `start` to `end`, inclusive. Empty when `start > end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// Subdirectories of `dir` whose names are all ASCII digits, sorted by
/// numeric value. Anything else (state file, stray files) is ignored.
pub fn numeric_subdirs(dir: &Path) -> io::Result<Vec<(u32, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(value) = name.parse::<u32>() {
            found.push((value, entry.path()));
        }
    }
    found.sort_by_key(|(value, _)| *value);
    Ok(found)
}

/// Record files in a day directory, sorted by name.
pub fn record_files(day_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(day_dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The newest day directory under `root` that contains at least one
/// record file.
pub fn latest_day_dir(root: &Path) -> io::Result<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }
    for (_, year) in numeric_subdirs(root)?.into_iter().rev() {
        for (_, month) in numeric_subdirs(&year)?.into_iter().rev() {
            for (_, day) in numeric_subdirs(&month)?.into_iter().rev() {
                if !record_files(&day)?.is_empty() {
                    return Ok(Some(day));
                }
            }
        }
    }
    Ok(None)
}

/// Append `line` and a newline to `path`, creating the file if needed.
///
/// The file is never truncated; the data is synced before returning.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())?;
    file.sync_data()
}

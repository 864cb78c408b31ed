//! Process count from /proc.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Number of live processes (numeric entries under /proc)
pub fn count() -> Result<u64> {
    count_in(Path::new("/proc"))
}

pub fn count_in(proc_dir: &Path) -> Result<u64> {
    let entries = fs::read_dir(proc_dir)
        .with_context(|| format!("Failed to list {}", proc_dir.display()))?;

    let count = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false)
        })
        .count();

    Ok(count as u64)
}

//! Extension-based language detection over a repository tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::language::Language;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "target",
    "dist",
    "build",
    "__pycache__",
    "vendor",
];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref())
}

/// Map each supported language to its files, relative to `repo` and sorted.
pub fn detect_languages(repo: &Path) -> std::io::Result<BTreeMap<Language, Vec<PathBuf>>> {
    let mut found: BTreeMap<Language, Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(repo).into_iter().filter_entry(|e| !is_skipped(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(e.into());
                }
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        if let Ok(rel) = entry.path().strip_prefix(repo) {
            found.entry(language).or_default().push(rel.to_path_buf());
        }
    }

    for files in found.values_mut() {
        files.sort();
    }
    Ok(found)
}

//! Directory walking for the scan node.

use std::ffi::OsStr;
use std::path::PathBuf;

use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub max_depth: Option<usize>,
    pub include_hidden: bool,
    /// Lowercased extensions without the dot; empty means "all files".
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the scan root.
    pub path: String,
    pub size: u64,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanSummary {
    pub root: String,
    pub files: Vec<FileEntry>,
    pub directories: usize,
    pub total_bytes: u64,
}

/// Walk the tree under `options.root` and inventory its files.
///
/// Unreadable entries are skipped rather than failing the whole scan; the
/// walk order is name-sorted so repeated scans of an unchanged tree produce
/// identical summaries.
pub fn scan(options: &ScanOptions) -> Result<ScanSummary, String> {
    if !options.root.is_dir() {
        return Err(format!("not a directory: {}", options.root.display()));
    }

    let mut walker = WalkDir::new(&options.root).sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut summary = ScanSummary {
        root: options.root.display().to_string(),
        ..Default::default()
    };

    let include_hidden = options.include_hidden;
    let entries = walker
        .into_iter()
        .filter_entry(move |entry| {
            // The root itself is always kept, whatever its name.
            entry.depth() == 0 || include_hidden || !is_hidden(entry.file_name())
        });

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry: {e}");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if entry.depth() > 0 {
                summary.directories += 1;
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let extension = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !options.extensions.is_empty() && !options.extensions.contains(&extension) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let path = entry
            .path()
            .strip_prefix(&options.root)
            .unwrap_or(entry.path())
            .display()
            .to_string();

        summary.total_bytes += size;
        summary.files.push(FileEntry {
            path,
            size,
            extension,
        });
    }

    Ok(summary)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

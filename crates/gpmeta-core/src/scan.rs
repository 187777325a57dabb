use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::{ThrottledProgress, UNKNOWN_TOTAL};

/// Whether `path` looks like a Takeout JSON sidecar (`*.json`, any case).
pub fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"))
}

/// Recursively collect every sidecar under `root`, sorted by path.
///
/// Enumeration errors are returned to the caller; nothing else in the run is fatal.
pub fn find_sidecars(root: &Path, progress: &ThrottledProgress<'_>) -> Result<Vec<PathBuf>> {
    let mut sidecars = Vec::new();
    let mut seen = 0u64;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        seen += 1;
        progress.report("scan", seen, UNKNOWN_TOTAL, "Scanning for sidecars");

        if entry.file_type().is_file() && is_sidecar(entry.path()) {
            sidecars.push(entry.into_path());
        }
    }

    progress.report("scan", seen, seen, "Scan complete");
    Ok(sidecars)
}

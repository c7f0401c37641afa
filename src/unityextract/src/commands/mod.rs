//! Command handlers for unityextract

pub mod extract;
pub mod list;

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Expand directory inputs into the files below them, in name order
///
/// Plain paths are kept even if they do not exist so the failure is
/// reported against that input.
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk_dir(input, &mut files);
        } else {
            files.push(input.clone());
        }
    }
    files
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
        }
    }
}

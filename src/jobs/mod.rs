//! Scheduled regression jobs
//!
//! - [`nightly`]: build one variant, run its tests through the runner
//!   subprocess and mail the outcome.
//! - [`cron`]: pull a fresh workspace, build the shared linkfarm and run the
//!   nightly job for each variant, then mail a combined summary.

pub mod cron;
pub mod nightly;

pub use cron::{run_cron, CronConfig, CronOutcome, CronPaths};
pub use nightly::{run_nightly, NightlyConfig, NightlyRun, NightlyTests};

use std::path::{Path, PathBuf};
use tracing::info;
use crate::error::{RegressError, Result};

/// Files directly inside `dir` that look like core dumps.
pub fn find_core_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut cores: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map_or(false, |n| n.to_string_lossy().to_lowercase().contains("core"))
        })
        .collect();
    cores.sort();
    cores
}

pub fn remove_core_files(dir: &Path) -> Result<usize> {
    let cores = find_core_files(dir);
    for core in &cores {
        std::fs::remove_file(core).map_err(|e| RegressError::from(e).with_path(core))?;
    }
    if !cores.is_empty() {
        info!(dir = %dir.display(), count = cores.len(), "removed core files");
    }
    Ok(cores.len())
}

/// Test names of a test-plan CSV: third column, unless the fourth reads
/// `MISSING`.
pub fn parse_test_plan(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let words: Vec<&str> = line.split(',').collect();
            match (words.get(2), words.get(3)) {
                (Some(name), Some(state)) if state.trim() != "MISSING" && !name.trim().is_empty() => {
                    Some(name.trim().to_string())
                }
                _ => None,
            }
        })
        .collect()
}

pub fn read_test_plan(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| RegressError::from(e).with_path(path))?;
    Ok(parse_test_plan(&text))
}

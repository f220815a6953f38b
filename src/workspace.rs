//! Workspace version control
//!
//! The version-control tool is an external program. Its plaintext answers
//! are parsed by the `parse_*` functions below so they can be tested without
//! the tool.

use std::fmt;
use std::path::{Path, PathBuf};
use regex::Regex;
use tracing::{info, warn};
use crate::error::{RegressError, Result};
use crate::process::{EnvOverrides, Invocation};

/// Exit code the pull command returns for warnings only.
const PULL_WARNING_EXIT: i32 = 255;

/// Project component whose label identifies the workspace version.
const PROJECT_COMPONENT: &str = ".acme_project";

/// The version-control tool.
#[derive(Debug, Clone)]
pub struct Vcs {
    program: PathBuf,
    env: EnvOverrides,
}

impl Vcs {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: EnvOverrides::new(),
        }
    }

    /// Overrides applied to every tool invocation.
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    fn invocation(&self, dir: &Path) -> Invocation {
        Invocation::new(&self.program).current_dir(dir).env(&self.env)
    }

    /// Create a new workspace of `branch` inside `dir`.
    pub fn pull(&self, dir: &Path, branch: &str) -> Result<()> {
        let inv = self
            .invocation(dir)
            .args(["nw", "-project", branch, "-sb", "xe"]);
        println!("Executing ({})", inv.display());
        let done = inv.status()?;
        match done.code {
            _ if done.success => Ok(()),
            Some(PULL_WARNING_EXIT) => {
                warn!("workspace pull finished with warnings");
                Ok(())
            }
            code => Err(RegressError::process_failed(inv.display(), code)),
        }
    }

    /// Bring the workspace around `binos_root` up to the latest of `branch`.
    pub fn update(&self, binos_root: &Path, branch: &str) -> Result<()> {
        let parent = binos_root.parent().unwrap_or(binos_root);
        let terse = EnvOverrides::new().with("ACME_VERBOSITY", "terse");
        self.invocation(parent)
            .env(&terse)
            .args(["update", "-comp"])
            .arg(format!("binos@{}/latest", branch))
            .check()
    }

    pub fn describe(&self, dir: &Path) -> Result<WorkspaceInfo> {
        let done = self
            .invocation(dir)
            .args(["desc", "-workspace", "-short"])
            .capture()?;
        if !done.success {
            warn!("workspace description failed");
        }
        Ok(parse_description(&done.text))
    }

    pub fn current_label(&self, dir: &Path) -> Result<Option<String>> {
        let done = self
            .invocation(dir)
            .args(["desc", "-comp", PROJECT_COMPONENT, "-short"])
            .capture()?;
        if !done.success {
            warn!("could not read the workspace label");
            return Ok(None);
        }
        Ok(done.text.lines().next().and_then(parse_label))
    }

    /// Changes committed between two labels.
    pub fn changes_between(&self, dir: &Path, last: &str, current: &str) -> Result<Vec<Change>> {
        let done = self
            .invocation(dir)
            .args(["refpoint_list", "-start_ver", last, "-end_ver", current, "-comp", PROJECT_COMPONENT])
            .capture()?;
        if !done.success {
            warn!(last, current, "could not list changes between labels");
            return Ok(Vec::new());
        }
        let changes = parse_changes(&done.text);
        info!(last, current, count = changes.len(), "changes since last label");
        Ok(changes)
    }
}

// ──────────────────────────────────────────────────────────
// Tool output parsing
// ──────────────────────────────────────────────────────────

/// Workspace name and development line; unknown fields read `none`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub workspace: String,
    pub devline: String,
    pub devline_version: String,
}

impl Default for WorkspaceInfo {
    fn default() -> Self {
        Self {
            workspace: "none".into(),
            devline: "none".into(),
            devline_version: "none".into(),
        }
    }
}

impl fmt::Display for WorkspaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.workspace, self.devline, self.devline_version)
    }
}

fn field_value(line: &str) -> Option<String> {
    line.split(':').nth(1).map(|v| v.trim().to_string())
}

pub fn parse_description(text: &str) -> WorkspaceInfo {
    let mut info = WorkspaceInfo::default();
    for line in text.lines() {
        if line.contains("Workspace") {
            if let Some(v) = field_value(line) {
                info.workspace = v;
            }
        }
        if line.contains("Devline  ") {
            if let Some(v) = field_value(line) {
                info.devline = v;
            }
        }
        if line.contains("Devline Ver ") {
            if let Some(v) = field_value(line) {
                info.devline_version = v;
            }
        }
    }
    info
}

/// `component@label` → `label`
pub fn parse_label(line: &str) -> Option<String> {
    let label = line.split('@').nth(1)?.trim_end();
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// One committed change between two labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub id: String,
    pub author: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  by {}", self.id, self.author)
    }
}

/// Pairs each `Change ID:` line with the `Created By:` line that follows.
pub fn parse_changes(text: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut pending: Option<String> = None;
    for line in text.lines() {
        if line.contains("Change ID:") {
            pending = field_value(line);
        }
        if line.contains("Created By:") {
            if let (Some(id), Some(author)) = (pending.take(), field_value(line)) {
                changes.push(Change { id, author });
            }
        }
    }
    changes
}

pub fn format_changes(changes: &[Change]) -> String {
    changes.iter().map(|c| format!("{}\n", c)).collect()
}

/// Merge-conflict count from the update log summary line
/// (`Update operation type summary (count): ...`), whose eleventh
/// space-separated word is `<kind>:<count>`.
pub fn parse_conflicts(update_log: &str) -> Option<u32> {
    let line = update_log
        .lines()
        .filter(|l| l.contains("Update operation type summary (count):"))
        .last()?;
    let word = line.split(' ').nth(10)?;
    word.split(':').nth(1)?.trim().parse().ok()
}

// ──────────────────────────────────────────────────────────
// Files kept between runs
// ──────────────────────────────────────────────────────────

/// One-line file naming the label of the last successful run.
#[derive(Debug, Clone)]
pub struct LabelMarker {
    path: PathBuf,
}

impl LabelMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => text
                .lines()
                .next()
                .map(|l| l.trim_end().to_string())
                .filter(|l| !l.is_empty()),
            Err(e) => {
                warn!(path = %self.path.display(), "open label file failed: {}", e);
                None
            }
        }
    }

    pub fn write(&self, label: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, label.trim_end())
            .map_err(|e| RegressError::from(e).with_path(&self.path))
    }
}

/// Whether the build logs already record a successful linkfarm build.
pub fn build_succeeded(build_logs: &Path) -> Result<bool> {
    let pattern = Regex::new(r"SUCC.*x86_64_binos_root")
        .map_err(|e| RegressError::config(e.to_string()))?;
    if !build_logs.is_dir() {
        return Ok(false);
    }
    scan_logs(build_logs, &pattern)
}

fn scan_logs(dir: &Path, pattern: &Regex) -> Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if scan_logs(&path, pattern)? {
                return Ok(true);
            }
        } else {
            let bytes = std::fs::read(&path)?;
            if pattern.is_match(&String::from_utf8_lossy(&bytes)) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_description() {
        let text = "\
Workspace      : SDKREG_10162026
Devline        : main_dev
Devline Ver    : 1234
";
        let info = parse_description(text);
        assert_eq!(info.workspace, "SDKREG_10162026");
        assert_eq!(info.devline, "main_dev");
        assert_eq!(info.devline_version, "1234");
        assert_eq!(info.to_string(), "SDKREG_10162026 (main_dev/1234)");
    }

    #[test]
    fn test_parse_description_defaults() {
        assert_eq!(parse_description("garbage"), WorkspaceInfo::default());
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label(".acme_project@main_dev_2026.10.15  \n"), Some("main_dev_2026.10.15".into()));
        assert_eq!(parse_label("no label here"), None);
    }

    #[test]
    fn test_parse_changes() {
        let text = "\
Change ID: CSCab12345
Created By: alice
Change ID: CSCcd67890
Comment: something
Created By: bob
";
        let changes = parse_changes(text);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1], Change { id: "CSCcd67890".into(), author: "bob".into() });
        assert_eq!(format_changes(&changes), "CSCab12345  by alice\nCSCcd67890  by bob\n");
    }

    #[test]
    fn test_parse_conflicts() {
        let log = "noise\nUpdate operation type summary (count): a:1 b:2 c:3 d:4 e:5 merge:7\n";
        assert_eq!(parse_conflicts(log), Some(7));
        assert_eq!(parse_conflicts("nothing"), None);
    }

    #[test]
    fn test_label_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = LabelMarker::new(dir.path().join("regression/last_label"));
        assert_eq!(marker.read(), None);
        marker.write("main_dev_1\n").unwrap();
        assert_eq!(marker.read().as_deref(), Some("main_dev_1"));
    }

    #[test]
    fn test_build_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!build_succeeded(&dir.path().join("missing")).unwrap());
        let nested = dir.path().join("x86");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("a.log"), "FAIL build_x86_64_binos_root\n").unwrap();
        assert!(!build_succeeded(dir.path()).unwrap());
        std::fs::write(nested.join("b.log"), "SUCCESS: build_x86_64_binos_root\n").unwrap();
        assert!(build_succeeded(dir.path()).unwrap());
    }
}

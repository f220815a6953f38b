//! Unattended multi-variant regression
//!
//! Pulls a dated workspace, builds the linkfarm once, then runs the nightly
//! job for every variant as a subprocess and mails one combined summary.
//! Every external command runs with the same PATH and BINOS_ROOT overrides.

use std::path::{Path, PathBuf};
use chrono::NaiveDate;
use tracing::{info, warn};
use crate::build::build_linkfarm;
use crate::error::{RegressError, Result};
use crate::layout::BuildLayout;
use crate::process::{EnvOverrides, Invocation, Program};
use crate::report::{self, Mailer, VariantResults};
use crate::results::parse_results;
use crate::variant::HardwareVariant;
use crate::workspace::{build_succeeded, format_changes, LabelMarker, Vcs, WorkspaceInfo};
use super::NightlyTests;

#[derive(Debug, Clone)]
pub struct CronConfig {
    /// Directory that holds dated workspaces and the `regression` records
    pub storage: PathBuf,
    pub branch: String,
    pub variants: Vec<HardwareVariant>,
    /// Patch files applied with `patch -p1 -f` after the pull
    pub patches: Vec<PathBuf>,
    /// Directories put in front of PATH
    pub extra_path: Vec<PathBuf>,
    /// Summary and failure notice recipients
    pub to: Vec<String>,
    /// Recipients of the per-variant nightly reports
    pub nightly_to: Vec<String>,
    pub from: String,
    pub date: NaiveDate,
    /// The nightly job, normally `sdk-regress nightly`
    pub nightly: Program,
    /// Tests each nightly job runs
    pub tests: NightlyTests,
    pub vcs_program: PathBuf,
    pub mailer: Mailer,
}

/// Names derived from the storage directory and the run date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPaths {
    pub view_tag: String,
    pub workspace: PathBuf,
    pub binos_root: PathBuf,
    pub ios_root: PathBuf,
    /// Per-run records: `<storage>/regression/<view_tag>`
    pub log_dir: PathBuf,
    pub label_file: PathBuf,
}

impl CronPaths {
    pub fn new(storage: &Path, date: NaiveDate) -> Self {
        let view_tag = format!("SDKREG_{}", date.format("%m%d%Y"));
        let workspace = storage.join(&view_tag);
        let records = storage.join("regression");
        Self {
            binos_root: workspace.join("binos"),
            ios_root: workspace.join("ios"),
            log_dir: records.join(&view_tag),
            label_file: records.join("last_label"),
            workspace,
            view_tag,
        }
    }

    pub fn changes_file(&self) -> PathBuf {
        self.log_dir.join(format!("changes.{}", self.view_tag))
    }
}

#[derive(Debug, Clone)]
pub enum CronOutcome {
    PullFailed,
    LinkfarmFailed,
    Completed { runs: Vec<VariantResults> },
}

pub fn run_cron(config: &CronConfig) -> Result<CronOutcome> {
    let paths = CronPaths::new(&config.storage, config.date);
    println!("Starting regression in {} in {}", config.branch, config.storage.display());
    println!("Results will be sent to {}", config.to.join(","));

    if paths.workspace.exists() {
        println!("Workspace {} already exists", paths.workspace.display());
        std::fs::remove_dir_all(&paths.workspace)?;
        println!("Workspace {} removed", paths.workspace.display());
    }
    std::fs::create_dir_all(&paths.workspace)?;

    let mut env = EnvOverrides::new();
    env.prepend_path("PATH", &config.extra_path);
    env.set("BINOS_ROOT", paths.binos_root.to_string_lossy());
    let vcs = Vcs::new(&config.vcs_program).with_env(env.clone());

    if let Err(e) = vcs.pull(&paths.workspace, &config.branch) {
        println!("###Error in pulling workspace: {}", e);
        remove_workspace(&paths.workspace);
        config.mailer.send(&report::pull_failed(&config.to, &config.from))?;
        return Ok(CronOutcome::PullFailed);
    }

    let outcome = run_pulled(config, &paths, &env, &vcs);
    remove_workspace(&paths.workspace);
    match outcome {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            println!("###Error in regression run: {}", e);
            if let Err(mail) = config.mailer.send(&report::cron_aborted(&config.to, &config.from, &e)) {
                warn!("abort notice not sent: {}", mail);
            }
            Err(e)
        }
    }
}

/// Everything after a successful pull. The caller removes the workspace.
fn run_pulled(config: &CronConfig, paths: &CronPaths, env: &EnvOverrides, vcs: &Vcs) -> Result<CronOutcome> {
    for patch in &config.patches {
        apply_patch(&paths.workspace, patch, env);
    }

    std::fs::create_dir_all(&paths.log_dir)
        .map_err(|e| RegressError::from(e).with_path(&paths.log_dir))?;
    let marker = LabelMarker::new(&paths.label_file);
    let last_label = marker.read();
    let current_label = vcs.current_label(&paths.workspace)?;
    let changes = match (&last_label, &current_label) {
        (Some(last), Some(current)) => {
            println!("Current label: {} Latest Label: {}", current, last);
            format_changes(&vcs.changes_between(&paths.workspace, last, current)?)
        }
        _ => {
            warn!("no label pair to compare, change list left empty");
            String::new()
        }
    };
    print!("{}", changes);
    let changes_file = paths.changes_file();
    std::fs::write(&changes_file, &changes)?;

    let layout = BuildLayout::new(&paths.binos_root);
    if build_succeeded(&layout.build_logs_dir())? {
        info!("linkfarm already built, skipping");
    } else if let Err(e) = build_linkfarm(&paths.ios_root, env) {
        println!("###Error in building binos linkfarm: {}", e);
        let workspace = describe(vcs, &paths.binos_root);
        config
            .mailer
            .send(&report::linkfarm_failed(&config.to, &config.from, &changes, &workspace))?;
        return Ok(CronOutcome::LinkfarmFailed);
    }

    let mut runs = Vec::new();
    for &variant in &config.variants {
        let inv = nightly_invocation(config, paths, variant, env);
        println!("Executing ({})", inv.display());
        let table = match inv.stream(false) {
            Ok(done) if done.success => parse_results(&done.text),
            failed => {
                if let Err(e) = failed {
                    warn!(variant = %variant, "nightly job did not start: {}", e);
                }
                println!("###Error in executing regression for {} (new AFD/RAL)", variant);
                let workspace = describe(vcs, &paths.binos_root);
                config.mailer.send(&report::variant_failed(
                    &config.to,
                    &config.from,
                    variant,
                    false,
                    &changes,
                    &workspace,
                ))?;
                None
            }
        };
        runs.push((variant, table));
    }

    config
        .mailer
        .send(&report::summary_message(&config.to, &config.from, &runs))?;

    if let Some(ref label) = current_label {
        marker.write(label)?;
    }
    Ok(CronOutcome::Completed { runs })
}

fn nightly_invocation(
    config: &CronConfig,
    paths: &CronPaths,
    variant: HardwareVariant,
    env: &EnvOverrides,
) -> Invocation {
    let mut inv = config
        .nightly
        .invocation()
        .current_dir(&paths.workspace)
        .env(env)
        .args(["-b".to_string(), paths.binos_root.to_string_lossy().to_string()])
        .args(["-a".to_string(), variant.label()]);
    for to in &config.nightly_to {
        inv = inv.args(["-e".to_string(), to.clone()]);
    }
    inv = match config.tests {
        NightlyTests::Plan(ref plan) => inv.args(["--plan".to_string(), plan.to_string_lossy().to_string()]),
        NightlyTests::Suites(ref suites) => inv.args(["--suites".to_string(), suites.clone()]),
        NightlyTests::Tests(ref tests) => inv.args(["--tests".to_string(), tests.join(":")]),
    };
    if let Some(program) = config.mailer.program() {
        inv = inv.args(["--sendmail".to_string(), program.to_string_lossy().to_string()]);
    }
    inv.args(["-k".to_string(), paths.changes_file().to_string_lossy().to_string()])
        .arg("-p")
}

/// Patch failures are reported and otherwise ignored.
fn apply_patch(workspace: &Path, patch: &Path, env: &EnvOverrides) {
    let inv = Invocation::new("patch")
        .args(["-p1", "-f"])
        .current_dir(workspace)
        .env(env)
        .stdin_file(patch);
    match inv.status() {
        Ok(done) if done.success => info!(patch = %patch.display(), "applied patch"),
        Ok(done) => warn!(patch = %patch.display(), code = ?done.code, "patch did not apply cleanly"),
        Err(e) => warn!(patch = %patch.display(), "patch failed: {}", e),
    }
}

fn describe(vcs: &Vcs, binos_root: &Path) -> WorkspaceInfo {
    vcs.describe(binos_root).unwrap_or_else(|e| {
        warn!("workspace description failed: {}", e);
        WorkspaceInfo::default()
    })
}

fn remove_workspace(workspace: &Path) {
    if let Err(e) = std::fs::remove_dir_all(workspace) {
        warn!(workspace = %workspace.display(), "cannot remove workspace: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_from_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 6).unwrap();
        let paths = CronPaths::new(Path::new("/storage"), date);
        assert_eq!(paths.view_tag, "SDKREG_10062026");
        assert_eq!(paths.binos_root, PathBuf::from("/storage/SDKREG_10062026/binos"));
        assert_eq!(paths.ios_root, PathBuf::from("/storage/SDKREG_10062026/ios"));
        assert_eq!(paths.label_file, PathBuf::from("/storage/regression/last_label"));
        assert_eq!(
            paths.changes_file(),
            PathBuf::from("/storage/regression/SDKREG_10062026/changes.SDKREG_10062026")
        );
    }
}

//! Nightly regression for one hardware variant

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use crate::build::BuildDriver;
use crate::error::Result;
use crate::layout::BuildLayout;
use crate::process::{EnvOverrides, Program};
use crate::report::{Mailer, NightlyReport, TestOutcome};
use crate::results::{parse_results, PASSED};
use crate::variant::HardwareVariant;
use crate::workspace::{parse_conflicts, Vcs, WorkspaceInfo};
use super::{find_core_files, read_test_plan, remove_core_files};

/// Tests handed to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NightlyTests {
    /// Implemented tests of a test-plan CSV
    Plan(PathBuf),
    /// Colon-separated suite names
    Suites(String),
    Tests(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct NightlyConfig {
    pub build_root: PathBuf,
    pub variant: HardwareVariant,
    pub tests: NightlyTests,
    /// Options forwarded to the runner with `-r`
    pub run_options: String,
    pub ported: bool,
    pub cflow: bool,
    /// Run tests against the existing build
    pub skip_build: bool,
    /// Leave the build in place afterwards
    pub keep_build: bool,
    /// Pull the latest of this branch into the workspace first
    pub update_branch: Option<String>,
    /// Repeat the run and mail a memory-analysis report
    pub memory_analysis: bool,
    /// File listing changes since the last successful run
    pub changes_file: Option<PathBuf>,
    pub to: Vec<String>,
    pub from: String,
    /// The test runner, normally `sdk-regress run`
    pub runner: Program,
    pub vcs: Vcs,
    pub mailer: Mailer,
}

/// Outcome of one pass over the tests.
#[derive(Debug, Clone)]
pub struct NightlyRun {
    pub outcomes: Vec<(String, TestOutcome)>,
    /// Everything the runner printed
    pub output: String,
    pub elapsed: Duration,
}

impl NightlyRun {
    pub fn passed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TestOutcome::Status(s) if s == PASSED))
            .count()
    }
}

impl NightlyConfig {
    fn test_args(&self) -> Result<Vec<String>> {
        let (flag, value) = match self.tests {
            NightlyTests::Plan(ref path) => ("-t", read_test_plan(path)?.join(":")),
            NightlyTests::Suites(ref suites) => ("-s", suites.clone()),
            NightlyTests::Tests(ref tests) => ("-t", tests.join(":")),
        };
        Ok(vec![flag.to_string(), value])
    }

    /// Rows to report when the runner printed no result table.
    fn requested(&self) -> Vec<String> {
        match self.tests {
            NightlyTests::Plan(ref path) => read_test_plan(path).unwrap_or_default(),
            NightlyTests::Suites(ref suites) => vec![suites.clone()],
            NightlyTests::Tests(ref tests) => tests.clone(),
        }
    }
}

/// Build, run, report and clean up.
pub fn run_nightly(config: &NightlyConfig) -> Result<Vec<NightlyRun>> {
    let layout = BuildLayout::new(&config.build_root);

    if let Some(ref branch) = config.update_branch {
        update_workspace(config, &layout, branch)?;
    }

    println!("BINOS_ROOT: {}", layout.root().display());
    println!("ASIC: {}", config.variant);
    println!("Email: {}", config.to.join(","));

    let driver = BuildDriver::new(layout.clone())
        .ported(config.ported)
        .cflow(config.cflow);
    if !config.skip_build {
        driver.clean_and_build(config.variant)?;
    }

    let changes = config.changes_file.as_ref().and_then(|path| {
        match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(path = %path.display(), "cannot read changes file: {}", e);
                None
            }
        }
    });

    let mut runs = Vec::new();
    let passes: &[bool] = if config.memory_analysis { &[false, true] } else { &[false] };
    for (i, &memory) in passes.iter().enumerate() {
        let run = run_tests(config, &layout)?;
        let report = NightlyReport {
            variant: config.variant,
            ported: config.ported,
            cflow: config.cflow,
            memory_analysis: memory,
            elapsed: run.elapsed,
            changes: changes.clone(),
            workspace: describe(config, &layout),
            results_dir: layout.results_dir(),
            outcomes: run.outcomes.clone(),
        };
        config.mailer.send(&report.message(&config.to, &config.from))?;
        runs.push(run);

        if i == 0 && !config.keep_build {
            driver.clean(config.variant)?;
        }
    }
    Ok(runs)
}

fn update_workspace(config: &NightlyConfig, layout: &BuildLayout, branch: &str) -> Result<()> {
    config.vcs.update(layout.root(), branch)?;
    let log = layout.root().join(".ACMEROOT/log/update_log");
    let conflicts = std::fs::read_to_string(&log)
        .ok()
        .and_then(|text| parse_conflicts(&text))
        .unwrap_or(0);
    println!("Merge conflicts: {}", conflicts);
    if conflicts > 0 {
        println!("!!! There are {} merge conflicts !!!", conflicts);
        println!("!!! Rerun the regression after fixing the conflicts !!!");
    }
    Ok(())
}

fn describe(config: &NightlyConfig, layout: &BuildLayout) -> WorkspaceInfo {
    config.vcs.describe(layout.root()).unwrap_or_else(|e| {
        warn!("workspace description failed: {}", e);
        WorkspaceInfo::default()
    })
}

/// One runner pass with a clean results directory.
fn run_tests(config: &NightlyConfig, layout: &BuildLayout) -> Result<NightlyRun> {
    let scripts = layout.scripts_dir();
    remove_core_files(&scripts)?;

    let results = layout.results_dir();
    if results.exists() {
        std::fs::remove_dir_all(&results)?;
    }
    std::fs::create_dir_all(&results)?;

    let mut inv = config
        .runner
        .invocation()
        .current_dir(layout.root())
        .env(&EnvOverrides::new().with("PTLOG_LEVEL", "3"))
        .arg("-q");
    if config.ported {
        inv = inv.arg("-p");
    }
    inv = inv
        .args(["-a".to_string(), config.variant.label()])
        .args(config.test_args()?);
    if !config.run_options.is_empty() {
        inv = inv.args(["-r".to_string(), config.run_options.clone()]);
    }
    inv = inv.args(["-b".to_string(), layout.root().to_string_lossy().to_string()]);

    println!("\nExecuting ({})", inv.display());
    let start = Instant::now();
    let output = match inv.stream(true) {
        Ok(done) => {
            if !done.success {
                warn!(code = ?done.code, "test runner exited with failure");
            }
            done.text
        }
        Err(e) => {
            warn!("test runner error: {}", e);
            String::new()
        }
    };
    let elapsed = start.elapsed();

    let crashed = !find_core_files(&scripts).is_empty();
    if crashed {
        println!("Coredump observed for {}", config.variant);
    }
    let outcomes: Vec<(String, TestOutcome)> = match parse_results(&output) {
        Some(table) => table
            .iter()
            .map(|(name, status)| {
                let outcome = if crashed && status != PASSED {
                    TestOutcome::Crashed
                } else {
                    TestOutcome::Status(status.to_string())
                };
                (name.to_string(), outcome)
            })
            .collect(),
        None => config
            .requested()
            .into_iter()
            .map(|name| (name, TestOutcome::RunFailed))
            .collect(),
    };
    info!(variant = %config.variant, tests = outcomes.len(), "nightly pass finished");
    Ok(NightlyRun { outcomes, output, elapsed })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn config(root: &Path, runner: &Path, tests: NightlyTests) -> NightlyConfig {
        NightlyConfig {
            build_root: root.to_path_buf(),
            variant: HardwareVariant::CS,
            tests,
            run_options: "TESTMODE=FEATURE".into(),
            ported: true,
            cflow: false,
            skip_build: true,
            keep_build: true,
            update_branch: None,
            memory_analysis: false,
            changes_file: None,
            to: vec!["team@example.com".into()],
            from: "regress".into(),
            runner: Program::new(runner),
            vcs: Vcs::new("/nonexistent/vcs"),
            mailer: Mailer::disabled(),
        }
    }

    #[test]
    fn test_runner_arguments_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let args = dir.path().join("args.txt");
        let runner = dir.path().join("runner.sh");
        script(
            &runner,
            &format!(
                "echo \"$@\" > {}\necho 'Results DopplerCS Test Count: 2'\necho '| A | PASSED |'\necho '| B | FAILED |'\n",
                args.display()
            ),
        );
        let root = dir.path().join("binos");
        std::fs::create_dir_all(&root).unwrap();
        let cfg = config(&root, &runner, NightlyTests::Tests(vec!["A".into(), "B".into()]));

        let layout = BuildLayout::new(&root);
        let run = run_tests(&cfg, &layout).unwrap();
        assert_eq!(run.passed_count(), 1);
        assert_eq!(run.outcomes[1], ("B".to_string(), TestOutcome::Status("FAILED".into())));
        assert!(layout.results_dir().is_dir());

        let recorded = std::fs::read_to_string(args).unwrap();
        assert_eq!(
            recorded.trim_end(),
            format!("-q -p -a DopplerCS -t A:B -r TESTMODE=FEATURE -b {}", root.display())
        );
    }

    #[test]
    fn test_no_table_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = dir.path().join("runner.sh");
        script(&runner, "echo boom\nexit 1\n");
        let cfg = config(dir.path(), &runner, NightlyTests::Suites("L2Suite:L3Suite".into()));
        let run = run_tests(&cfg, &BuildLayout::new(dir.path())).unwrap();
        assert_eq!(
            run.outcomes,
            vec![("L2Suite:L3Suite".to_string(), TestOutcome::RunFailed)]
        );
    }

    #[test]
    fn test_core_dump_marks_failures_crashed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(dir.path());
        let scripts = layout.scripts_dir();
        let runner = dir.path().join("runner.sh");
        script(
            &runner,
            &format!(
                "touch {}/core.42\necho 'Results DopplerCS Test Count: 2'\necho '| A | PASSED |'\necho '| B | FAILED |'\n",
                scripts.display()
            ),
        );
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("core.old"), "").unwrap();

        let cfg = config(dir.path(), &runner, NightlyTests::Tests(vec!["A".into(), "B".into()]));
        let run = run_tests(&cfg, &layout).unwrap();
        assert!(!scripts.join("core.old").exists());
        assert_eq!(run.outcomes[0].1, TestOutcome::Status("PASSED".into()));
        assert_eq!(run.outcomes[1].1, TestOutcome::Crashed);
    }
}

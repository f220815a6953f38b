//! Test runner
//!
//! Resolves the requested test cases, stages the simulator release and runs
//! each case against it, classifying the per-test log. The final table is
//! printed in the format [`crate::results::parse_results`] reads back.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use crate::catalogue::TestCase;
use crate::error::{RegressError, Result};
use crate::layout::BuildLayout;
use crate::process::Invocation;
use crate::results::{classify_log, classify_unit_log, render_results, ResultTable, FAILED, FAILED_MISSING, FAILED_RUN, PASSED};
use crate::simulator::{check_build, choose_release, ReleaseMarker, SimulatorRelease};
use crate::suites;
use crate::variant::HardwareVariant;

/// Which tests to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelection {
    /// Colon-separated suite names looked up in the variant catalogue
    Suites(String),
    /// Colon-separated test names, each optionally `name@options`
    Tests(String),
    /// File holding a colon-separated test list
    File(PathBuf),
    /// Every entry of the variant catalogue
    WholeRegression,
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Build root (`BINOS_ROOT`)
    pub build_root: PathBuf,
    pub variant: HardwareVariant,
    pub selection: TestSelection,
    /// Options for cases that carry none of their own
    pub run_options: String,
    /// Fixed log file name inside the logs directory
    pub log_file: Option<String>,
    pub quiet: bool,
    /// Expect the ported code base libraries
    pub ported: bool,
    /// Simulator release to use instead of the recorded one
    pub release: Option<String>,
    /// Directory holding simulator releases
    pub release_prefix: Option<PathBuf>,
    /// Run this executable instead of the linked simulator
    pub simulator: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(build_root: impl Into<PathBuf>, variant: HardwareVariant, selection: TestSelection) -> Self {
        Self {
            build_root: build_root.into(),
            variant,
            selection,
            run_options: String::new(),
            log_file: None,
            quiet: false,
            ported: false,
            release: None,
            release_prefix: None,
            simulator: None,
        }
    }
}

// ──────────────────────────────────────────────────────────
// Unit tests outside the simulator
// ──────────────────────────────────────────────────────────

/// A unit-test suite run through the linkfarm python.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTest {
    pub name: &'static str,
    /// Script under the variant's `usr/binos/lib`
    pub script: &'static str,
    /// Log file the script writes inside the logs directory
    pub log: &'static str,
}

pub const UNIT_TESTS: [UnitTest; 3] = [
    UnitTest { name: "aalUT", script: "aal_test_runner.py", log: "aal_ut.log" },
    UnitTest { name: "capUT", script: "cap_test_runner.py", log: "cap_ut.log" },
    UnitTest { name: "spectraUT", script: "spectra.py", log: "spectra_ut.log" },
];

pub fn unit_test(name: &str) -> Option<&'static UnitTest> {
    UNIT_TESTS.iter().find(|t| t.name == name)
}

/// Whether `<name>.py` exists below `root`, ignoring `.CC` directories.
pub fn locate_test(root: &Path, name: &str) -> bool {
    let file = format!("{}.py", name);
    let Ok(entries) = std::fs::read_dir(root) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.to_string_lossy().contains(".CC") {
                continue;
            }
            if locate_test(&path, name) {
                return true;
            }
        } else if path.file_name().map_or(false, |n| n == file.as_str()) {
            return true;
        }
    }
    false
}

// ──────────────────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────────────────

/// Statuses of one run, in execution order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub variant: HardwareVariant,
    pub results: Vec<(String, String)>,
    pub duration: Duration,
}

impl RunReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|(_, s)| s == PASSED).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed_count() == self.results.len()
    }

    /// Later runs of the same test replace earlier ones.
    pub fn table(&self) -> ResultTable {
        self.results.iter().map(|(n, s)| (n.clone(), s.clone())).collect()
    }

    pub fn render(&self) -> String {
        render_results(
            &self.variant.label(),
            self.results.iter().map(|(n, s)| (n.as_str(), s.as_str())),
        )
    }
}

// ──────────────────────────────────────────────────────────
// Runner
// ──────────────────────────────────────────────────────────

/// The test runner
pub struct TestRunner {
    config: RunConfig,
    layout: BuildLayout,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        let layout = BuildLayout::new(&config.build_root);
        Self { config, layout }
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Test cases for the configured selection. An empty list is an error.
    pub fn resolve_cases(&self) -> Result<Vec<TestCase>> {
        let variant = self.config.variant;
        let cases = match self.config.selection {
            TestSelection::Suites(ref list) => suites::collect_suites(&self.layout, variant, list)?,
            TestSelection::Tests(ref list) => split_list(list),
            TestSelection::File(ref path) => {
                let text = std::fs::read_to_string(path).map_err(|_| {
                    RegressError::config("test list file not found").with_path(path)
                })?;
                split_list(&text)
            }
            TestSelection::WholeRegression => {
                suites::catalogue_for(&self.layout, variant)?.all_entries()
            }
        };
        if cases.is_empty() {
            return Err(RegressError::config(
                "No test case provided or found in the test suite",
            ));
        }
        Ok(cases)
    }

    /// Pick, verify, record and link the simulator release.
    pub fn prepare(&self) -> Result<SimulatorRelease> {
        let variant = self.config.variant;
        if !self.config.quiet {
            println!("Using BINOS_ROOT: {}", self.layout.root().display());
        }
        check_build(&self.layout, variant, self.config.ported)?;

        let marker = ReleaseMarker::new(self.layout.release_marker(variant));
        let mut release = choose_release(variant, self.config.release.as_deref(), &marker);
        if let Some(ref prefix) = self.config.release_prefix {
            release = release.with_prefix(prefix);
        }
        if !self.config.quiet {
            println!("Using the simulator release: {}", release.name());
        }
        release.check()?;
        if marker.record(release.name())? {
            info!(release = release.name(), "recorded simulator release");
        }
        release.link(&self.layout)?;
        Ok(release)
    }

    /// Resolve, prepare and run everything.
    pub fn run(&self) -> Result<RunReport> {
        let cases = self.resolve_cases()?;
        let release = self.prepare()?;
        Ok(self.run_all(&cases, &release))
    }

    /// Run every case in order. Individual failures end up in the report.
    pub fn run_all(&self, cases: &[TestCase], release: &SimulatorRelease) -> RunReport {
        let start = Instant::now();
        let total = cases.len();
        let mut results = Vec::with_capacity(total);
        for (idx, case) in cases.iter().enumerate() {
            let (name, options) = self.plan(case);
            let status = self.run_one(&name, &options, release, idx + 1, total);
            results.push((name, status));
        }
        RunReport {
            variant: self.config.variant,
            results,
            duration: start.elapsed(),
        }
    }

    /// Test name and run options of a case. A case's own options win;
    /// whole-regression runs never fall back to the configured ones.
    fn plan(&self, case: &TestCase) -> (String, String) {
        if let Some(expanded) = case.directive() {
            return expanded;
        }
        let options = if !case.run_options.is_empty() {
            case.run_options.clone()
        } else if self.config.selection == TestSelection::WholeRegression {
            String::new()
        } else {
            self.config.run_options.clone()
        };
        (case.name.clone(), options)
    }

    fn log_path(&self, name: &str, options: &str) -> PathBuf {
        match self.config.log_file {
            Some(ref file) => self.layout.logs_dir().join(file),
            None => self
                .layout
                .test_log(name, self.config.variant, options.contains("FEATURE")),
        }
    }

    fn run_one(&self, name: &str, options: &str, release: &SimulatorRelease, idx: usize, total: usize) -> String {
        let log = self.log_path(name, options);
        if log.exists() {
            if let Err(e) = std::fs::remove_file(&log) {
                warn!(log = %log.display(), "could not remove old log: {}", e);
            }
        }

        if !locate_test(&self.layout.test_suite_dir(), name) {
            println!("Test {} doesn't exist", name);
            return FAILED_MISSING.to_string();
        }
        println!("Running Test {} ({}/{})", name, idx, total);

        let outcome = match unit_test(name) {
            Some(unit) => self.run_unit(unit).map(|passed| {
                if passed { PASSED } else { FAILED }
            }),
            None => self.run_simulator(name, options, &log, release),
        };
        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                warn!(test = name, "run failed: {}", e);
                FAILED_RUN
            }
        };
        println!("- {}", if status == PASSED { PASSED } else { FAILED });
        status.to_string()
    }

    fn executable(&self) -> PathBuf {
        match self.config.simulator {
            Some(ref exe) => exe.clone(),
            None => self.layout.simulator_link(self.config.variant),
        }
    }

    fn run_simulator(&self, name: &str, options: &str, log: &Path, release: &SimulatorRelease) -> Result<&'static str> {
        let options = shell_words::split(options)
            .unwrap_or_else(|_| options.split_whitespace().map(String::from).collect());
        let inv = Invocation::new(self.executable())
            .current_dir(self.layout.scripts_dir())
            .env(&release.library_env(&self.layout))
            .arg(format!("TESTNAME={}", name))
            .args(options);
        if !self.config.quiet {
            println!("Executing ({})", inv.display());
        }
        inv.to_log(log, true)?;
        Ok(classify_log(&read_log(log)))
    }

    fn run_unit(&self, unit: &UnitTest) -> Result<bool> {
        let variant = self.config.variant;
        let log = self.layout.logs_dir().join(unit.log);
        if log.exists() {
            std::fs::remove_file(&log)?;
        }
        let script = self.layout.variant_libraries(variant).join(unit.script);
        let inv = Invocation::new(self.layout.python())
            .current_dir(self.layout.scripts_dir())
            .arg(script.to_string_lossy())
            .args(["-a".to_string(), variant.label()]);
        if !self.config.quiet {
            println!("Executing ({})", inv.display());
        }
        inv.to_log(&log, true)?;
        Ok(classify_unit_log(&read_log(&log)))
    }
}

/// Log text; unreadable logs classify as empty.
fn read_log(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) => {
            warn!(log = %path.display(), "cannot read log: {}", e);
            String::new()
        }
    }
}

fn split_list(list: &str) -> Vec<TestCase> {
    list.split(':')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(TestCase::parse)
        .collect()
}

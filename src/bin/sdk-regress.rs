//! sdk-regress CLI
//!
//! Run regression tests against the SDK simulator and mail the results.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use sdk_regress::jobs::{self, CronConfig, CronOutcome, NightlyConfig, NightlyTests};
use sdk_regress::report::Mailer;
use sdk_regress::{
    parse_results, render_summaries, summarize_suites, Catalogue, HardwareVariant, Program,
    RunConfig, TestRunner, TestSelection, Vcs,
};

#[derive(Parser, Debug)]
#[command(name = "sdk-regress")]
#[command(version)]
#[command(about = "Run SDK regression tests against the hardware simulator")]
struct Cli {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run tests of one variant
    Run(RunArgs),
    /// Build one variant, run its tests and mail the report
    Nightly(NightlyArgs),
    /// Pull a fresh workspace and run every variant
    Cron(CronArgs),
    /// Per-suite pass counts of a runner output
    Suites(SuitesArgs),
    /// Print what the parsers extract
    #[command(subcommand)]
    Parse(ParseCmd),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selection").required(true).args(["suites", "tests", "file", "regression"])))]
struct RunArgs {
    /// Hardware variant, e.g. DopplerCS
    #[arg(short = 'a', long = "asic")]
    variant: HardwareVariant,

    #[arg(short = 'b', long = "binos-root", env = "BINOS_ROOT")]
    binos_root: PathBuf,

    /// Suites to run (Suite1:Suite2)
    #[arg(short = 's', long = "test-suite")]
    suites: Option<String>,

    /// Tests to run (L2Basic:L3Basic)
    #[arg(short = 't', long = "test-cases")]
    tests: Option<String>,

    /// File with a colon-separated test list
    #[arg(short = 'f', long = "file-test-cases")]
    file: Option<PathBuf>,

    /// Run every entry of the regression catalogue
    #[arg(short = 'z', long = "whole-regression")]
    regression: bool,

    /// Run options for tests without their own
    #[arg(short = 'r', long = "run-opts", default_value = "")]
    run_options: String,

    /// Log file name inside the logs directory
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<String>,

    #[arg(short = 'q', long)]
    quiet: bool,

    /// Run with the ported code base
    #[arg(short = 'p', long = "port")]
    ported: bool,

    /// Simulator release to use
    #[arg(short = 'd', long = "release")]
    release: Option<String>,

    /// Directory holding simulator releases
    #[arg(long = "release-prefix")]
    release_prefix: Option<PathBuf>,

    /// Run this executable instead of the linked simulator
    #[arg(long)]
    simulator: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MailArgs {
    /// sendmail-compatible program; reports are printed when absent
    #[arg(long, env = "SDK_REGRESS_SENDMAIL")]
    sendmail: Option<PathBuf>,

    /// Sender address
    #[arg(long = "from", env = "USER", default_value = "regress")]
    from: String,
}

impl MailArgs {
    fn mailer(&self) -> Mailer {
        match self.sendmail {
            Some(ref program) => Mailer::sendmail(program),
            None => Mailer::disabled(),
        }
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selection").required(true).args(["plan", "suites", "tests"])))]
struct TestArgs {
    /// Test-plan CSV; implemented tests are run
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Suites to run (Suite1:Suite2)
    #[arg(long)]
    suites: Option<String>,

    /// Tests to run (L2Basic:L3Basic)
    #[arg(long)]
    tests: Option<String>,
}

impl TestArgs {
    fn selection(&self) -> Result<NightlyTests> {
        if let Some(ref plan) = self.plan {
            Ok(NightlyTests::Plan(plan.clone()))
        } else if let Some(ref suites) = self.suites {
            Ok(NightlyTests::Suites(suites.clone()))
        } else if let Some(ref tests) = self.tests {
            Ok(NightlyTests::Tests(tests.split(':').map(String::from).collect()))
        } else {
            bail!("no tests selected")
        }
    }
}

#[derive(Args, Debug)]
struct NightlyArgs {
    #[arg(short = 'a', long = "asic", default_value = "DopplerCS")]
    variant: HardwareVariant,

    #[arg(short = 'b', long = "binos-root", env = "BINOS_ROOT")]
    binos_root: PathBuf,

    /// Report recipient; repeat for more
    #[arg(short = 'e', long = "email", required = true)]
    to: Vec<String>,

    /// File listing changes since the last successful run
    #[arg(short = 'k', long = "changes")]
    changes: Option<PathBuf>,

    #[command(flatten)]
    tests: TestArgs,

    /// Options passed to every test
    #[arg(long = "run-opts", default_value = "TESTMODE=FEATURE")]
    run_options: String,

    /// Repeat the run and mail a memory-analysis report
    #[arg(short = 'm', long = "memory-analysis")]
    memory_analysis: bool,

    /// Update the workspace to the latest of this branch first
    #[arg(short = 'l', long = "latest")]
    latest: Option<String>,

    /// Do not ask before updating the workspace
    #[arg(short = 'y', long)]
    yes: bool,

    /// Build and run the ported code base
    #[arg(short = 'p', long = "new-code")]
    ported: bool,

    /// Build with cflow enabled
    #[arg(short = 'f', long)]
    cflow: bool,

    /// Skip clean and build, run tests directly
    #[arg(short = 's', long = "skip")]
    skip_build: bool,

    /// Skip clean after run
    #[arg(short = 'r', long = "after-run")]
    keep_build: bool,

    /// Version-control tool
    #[arg(long, default_value = "acme")]
    vcs: PathBuf,

    #[command(flatten)]
    mail: MailArgs,
}

#[derive(Args, Debug)]
struct CronArgs {
    /// Summary recipient; repeat for more
    #[arg(short = 'e', long = "email", required = true)]
    to: Vec<String>,

    /// Directory for dated workspaces
    #[arg(short = 's', long)]
    storage: PathBuf,

    #[arg(short = 'b', long, default_value = "main")]
    branch: String,

    /// Variants to run; repeat for more
    #[arg(short = 'a', long = "asic", default_values = ["DopplerCS", "DopplerD"])]
    variants: Vec<HardwareVariant>,

    /// Patch applied to the fresh workspace; repeat for more
    #[arg(long)]
    patch: Vec<PathBuf>,

    /// Directory put in front of PATH; repeat for more
    #[arg(long = "path-dir")]
    path_dirs: Vec<PathBuf>,

    /// Recipient of per-variant reports [default: the summary recipients]
    #[arg(long = "nightly-email")]
    nightly_to: Vec<String>,

    #[command(flatten)]
    tests: TestArgs,

    #[arg(long, default_value = "acme")]
    vcs: PathBuf,

    #[command(flatten)]
    mail: MailArgs,
}

#[derive(Args, Debug)]
struct SuitesArgs {
    /// Regression catalogue
    #[arg(short = 'c', long)]
    catalogue: PathBuf,

    /// Suites to summarize (Suite1:Suite2)
    #[arg(short = 's', long)]
    suites: String,

    /// Runner output holding a result table
    results: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ParseCmd {
    /// Test cases of suites in a catalogue
    Suite {
        catalogue: PathBuf,
        /// Suite1:Suite2
        suites: String,
    },
    /// Result table of a runner output
    Results { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "sdk_regress=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "sdk_regress=warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Command::Run(args) => run(args),
        Command::Nightly(args) => nightly(args),
        Command::Cron(args) => cron(args),
        Command::Suites(args) => suites(args),
        Command::Parse(cmd) => parse(cmd),
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let selection = if let Some(suites) = args.suites {
        TestSelection::Suites(suites)
    } else if let Some(tests) = args.tests {
        TestSelection::Tests(tests)
    } else if let Some(file) = args.file {
        TestSelection::File(file)
    } else {
        TestSelection::WholeRegression
    };

    let mut config = RunConfig::new(args.binos_root, args.variant, selection);
    config.run_options = args.run_options;
    config.log_file = args.log_file;
    config.quiet = args.quiet;
    config.ported = args.ported;
    config.release = args.release;
    config.release_prefix = args.release_prefix;
    config.simulator = args.simulator;

    let runner = TestRunner::new(config);
    let report = runner.run()?;
    println!();
    print!("{}", report.render());
    println!();

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn confirm_update() -> Result<bool> {
    println!("****************************************************************");
    println!("** Running with latest code could cause merge conflicts.      **");
    println!("** The workspace of this regression will be affected. Rerun   **");
    println!("** the regression after fixing any conflicts.                 **");
    println!("****************************************************************");
    println!("Do you want to proceed [y/n] ");
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn nightly(args: NightlyArgs) -> Result<ExitCode> {
    let update_branch = match args.latest {
        Some(branch) if args.yes || confirm_update()? => Some(branch),
        _ => None,
    };
    let config = NightlyConfig {
        build_root: args.binos_root,
        variant: args.variant,
        tests: args.tests.selection()?,
        run_options: args.run_options,
        ported: args.ported,
        cflow: args.cflow,
        skip_build: args.skip_build,
        keep_build: args.keep_build,
        update_branch,
        memory_analysis: args.memory_analysis,
        changes_file: args.changes,
        to: args.to,
        from: args.mail.from.clone(),
        runner: Program::current_exe("run").context("locating the test runner")?,
        vcs: Vcs::new(args.vcs),
        mailer: args.mail.mailer(),
    };
    let runs = jobs::run_nightly(&config).context("nightly regression failed")?;
    for run in &runs {
        println!(
            "{}: {}/{} passed in {}s",
            config.variant,
            run.passed_count(),
            run.outcomes.len(),
            run.elapsed.as_secs()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cron(args: CronArgs) -> Result<ExitCode> {
    if !args.storage.is_dir() {
        bail!("Storage {} provided does not exist", args.storage.display());
    }
    let nightly_to = if args.nightly_to.is_empty() {
        args.to.clone()
    } else {
        args.nightly_to
    };
    let config = CronConfig {
        storage: args.storage,
        branch: args.branch,
        variants: args.variants,
        patches: args.patch,
        extra_path: args.path_dirs,
        to: args.to,
        nightly_to,
        from: args.mail.from.clone(),
        date: chrono::Local::now().date_naive(),
        nightly: Program::current_exe("nightly").context("locating the nightly job")?,
        tests: args.tests.selection()?,
        vcs_program: args.vcs,
        mailer: args.mail.mailer(),
    };
    match jobs::run_cron(&config)? {
        CronOutcome::Completed { runs } => {
            for (variant, table) in &runs {
                match table {
                    Some(t) => println!("{}: {}/{}", variant, t.passed_count(), t.len()),
                    None => println!("{}: run failed", variant),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        CronOutcome::PullFailed | CronOutcome::LinkfarmFailed => {
            println!("Workspace build failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn suites(args: SuitesArgs) -> Result<ExitCode> {
    let catalogue = Catalogue::load(&args.catalogue)?;
    let output = std::fs::read_to_string(&args.results)
        .with_context(|| format!("reading {}", args.results.display()))?;
    let Some(results) = parse_results(&output) else {
        bail!("no result table in {}", args.results.display());
    };
    let names: Vec<&str> = args.suites.split(':').filter(|s| !s.is_empty()).collect();
    print!("{}", render_summaries(&summarize_suites(&catalogue, &names, &results)));
    Ok(ExitCode::SUCCESS)
}

fn parse(cmd: ParseCmd) -> Result<ExitCode> {
    match cmd {
        ParseCmd::Suite { catalogue, suites } => {
            let catalogue = Catalogue::load(&catalogue)?;
            for case in catalogue.collect_suites(&suites)? {
                println!("{}", case);
            }
        }
        ParseCmd::Results { file } => {
            let output = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            match parse_results(&output) {
                Some(table) => {
                    for (name, status) in table.iter() {
                        println!("{}\t{}", name, status);
                    }
                }
                None => {
                    println!("no result table");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

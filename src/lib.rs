//! sdk-regress: regression runner for SDK hardware simulation
//!
//! Runs regression tests of a hardware-test workspace against an external
//! simulator and mails the results. Building, simulating, version control and
//! mail transfer are external programs driven as subprocesses. The crate owns
//! the text formats in between.
//!
//! # Overview
//!
//! A regression catalogue lists named suites of test entries:
//!
//! ```text
//! Layer3Mtu =
//! L3MTU1500,"WAIT=1"
//! L3_BASIC,"WAIT=1 TESTMODE=FEATURE"
//! ```
//!
//! The runner prints a result table that the nightly and cron jobs read back:
//!
//! ```text
//! Results DopplerCS Test Count: 2
//! +---------------------------------------------------+
//! | L3MTU1500                                | PASSED |
//! | L3                                       | FAILED |
//! +---------------------------------------------------+
//! ```
//!
//! # Jobs
//!
//! | Job | Description |
//! |-----|-------------|
//! | `run` | Run tests of one variant against the simulator |
//! | `nightly` | Build one variant, run its tests, mail the report |
//! | `cron` | Fresh workspace, every variant, mail a summary |
//! | `suites` | Per-suite pass counts from a result table |
//! | `parse` | Extract suites or results from text |

mod build;
mod catalogue;
mod error;
mod layout;
mod process;
mod results;
mod runner;
mod simulator;
mod suites;
mod variant;
mod workspace;

pub mod jobs;
pub mod report;

pub use build::{build_linkfarm, BuildDriver, LINKFARM_BUILDER, LINKFARM_TARGET};
pub use catalogue::{
    entry_token, extract_suite, is_suite_header, join_entries, parse_entries, split_entries,
    suite_block, Catalogue, EntryRule, TestCase, ENTRY_SEPARATOR,
};
pub use error::{ErrorKind, RegressError, Result};
pub use layout::BuildLayout;
pub use process::{join_search_path, Captured, EnvOverrides, Invocation, Program};
pub use results::{
    classify_log, classify_unit_log, parse_results, render_results, ResultTable, FAILED,
    FAILED_MISSING, FAILED_PACKET_MISMATCH, FAILED_RUN, PASSED, RESULTS_MARKER,
};
pub use runner::{locate_test, unit_test, RunConfig, RunReport, TestRunner, TestSelection, UnitTest, UNIT_TESTS};
pub use simulator::{check_build, choose_release, ReleaseMarker, SimulatorRelease};
pub use suites::{catalogue_for, collect_suites, render_summaries, summarize_suites, SuiteSummary};
pub use variant::{HardwareVariant, ReleaseInfo};
pub use workspace::{
    build_succeeded, format_changes, parse_changes, parse_conflicts, parse_description,
    parse_label, Change, LabelMarker, Vcs, WorkspaceInfo,
};

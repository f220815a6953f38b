//! Suite sets
//!
//! Resolves `Suite1:Suite2` requests against the catalogue of a hardware
//! variant and summarizes results per suite.

use crate::catalogue::{Catalogue, TestCase};
use crate::error::{RegressError, Result};
use crate::layout::BuildLayout;
use crate::results::ResultTable;
use crate::variant::HardwareVariant;

/// Load the catalogue belonging to `variant`.
pub fn catalogue_for(layout: &BuildLayout, variant: HardwareVariant) -> Result<Catalogue> {
    let path = layout.catalogue_path(variant).ok_or_else(|| {
        RegressError::config(format!("no regression catalogue for {}", variant))
    })?;
    Catalogue::load(path)
}

/// Test cases of every requested suite, concatenated in request order.
pub fn collect_suites(
    layout: &BuildLayout,
    variant: HardwareVariant,
    suites: &str,
) -> Result<Vec<TestCase>> {
    catalogue_for(layout, variant)?.collect_suites(suites)
}

/// Pass count of one suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSummary {
    pub suite: String,
    pub passed: usize,
    pub total: usize,
    /// Tests that ran without passing, or did not run at all
    pub not_passed: Vec<String>,
}

/// A test counts as passed when its status mentions `PASS`.
pub fn summarize_suites(catalogue: &Catalogue, suites: &[&str], results: &ResultTable) -> Vec<SuiteSummary> {
    suites
        .iter()
        .map(|suite| {
            let tests = catalogue.suite(suite);
            let not_passed: Vec<String> = tests
                .iter()
                .filter(|t| !matches!(results.get(&t.name), Some(status) if status.contains("PASS")))
                .map(|t| t.name.clone())
                .collect();
            SuiteSummary {
                suite: suite.to_string(),
                passed: tests.len() - not_passed.len(),
                total: tests.len(),
                not_passed,
            }
        })
        .collect()
}

pub fn render_summaries(summaries: &[SuiteSummary]) -> String {
    let mut out = String::new();
    for s in summaries {
        out.push_str(&format!("{:>30} : {:>2}/{:>2}", s.suite, s.passed, s.total));
        if !s.not_passed.is_empty() {
            out.push_str(&format!("  {}", s.not_passed.join(" ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = "\
L2Suite =
L2Basic,
L2Vlan,

L3Suite =
L3Basic,
";

    #[test]
    fn test_summarize() {
        let catalogue = Catalogue::from_text("c.regress", CATALOGUE);
        let results: ResultTable = [("L2Basic", "PASSED"), ("L2Vlan", "FAILED"), ("L3Basic", "PASSED")]
            .into_iter()
            .collect();
        let summaries = summarize_suites(&catalogue, &["L2Suite", "L3Suite"], &results);
        assert_eq!(summaries[0].passed, 1);
        assert_eq!(summaries[0].total, 2);
        assert_eq!(summaries[0].not_passed, vec!["L2Vlan".to_string()]);
        assert_eq!(summaries[1].not_passed, Vec::<String>::new());
        let text = render_summaries(&summaries);
        assert!(text.contains("L2Suite :  1/ 2  L2Vlan\n"));
    }

    #[test]
    fn test_variant_without_catalogue() {
        let layout = BuildLayout::new("/r");
        let err = collect_suites(&layout, HardwareVariant::G, "L2Suite").unwrap_err();
        assert!(err.message.contains("DopplerG"));
    }

    #[test]
    fn test_missing_catalogue_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BuildLayout::new(dir.path());
        let err = collect_suites(&layout, HardwareVariant::CS, "L2Suite").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CatalogueMissing);
    }
}

//! Regression catalogue parser
//!
//! A catalogue ("regress file") lists named suites. A suite starts at a
//! header line `<name> = ...` and owns every following line up to the first
//! empty line:
//!
//! ```text
//! Layer3Mtu =
//! L3MTU1500,"WAIT=1"
//! L3_BASIC,"WAIT=1 TESTMODE=FEATURE"
//! L2_DIRECTIVE,"TESTNAME=L2Basic WAIT=2"
//!
//! Layer3Frag =
//! FRAG_TEST,"WAIT=1"
//! ```
//!
//! Entry lines mix three conventions (bare comma lists, quoted `TESTNAME`
//! directives and underscore-qualified names with quoted run options).
//! Catalogue files are not ours to rewrite, so the rule order in
//! [`EntryRule::classify`] is fixed.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use crate::error::{RegressError, Result};

/// Separator used by the flat `name@opts&&&&name@opts` encoding.
pub const ENTRY_SEPARATOR: &str = "&&&&";

/// Marker of a run-option directive entry.
const DIRECTIVE: &str = "TESTNAME";

/// One test extracted from a catalogue entry line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCase {
    /// Test identifier
    pub name: String,
    /// Opaque options forwarded to the simulator; empty when absent
    pub run_options: String,
}

impl TestCase {
    pub fn new(name: impl Into<String>, run_options: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_options: run_options.into(),
        }
    }

    /// Decode a `name` or `name@run_options` token. Splits at the first `@`.
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('@') {
            Some((name, opts)) => Self::new(name, opts),
            None => Self::new(entry, ""),
        }
    }

    /// Encode as `name@run_options`, or just `name` without options.
    pub fn encode(&self) -> String {
        if self.run_options.is_empty() {
            self.name.clone()
        } else {
            format!("{}@{}", self.name, self.run_options)
        }
    }

    /// Expand a `TESTNAME=<name> <options...>` directive entry into the real
    /// test name and its options. Returns `None` for ordinary entries.
    pub fn directive(&self) -> Option<(String, String)> {
        if !self.name.contains(DIRECTIVE) {
            return None;
        }
        let text = self.name.trim();
        let first = text.split_whitespace().next()?;
        let name = first.replace("TESTNAME=", "");
        let options = text[first.len()..].trim().to_string();
        Some((name, options))
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ──────────────────────────────────────────────────────────
// Entry rules
// ──────────────────────────────────────────────────────────

/// How a normalized entry line contributes to the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRule {
    /// `_list` reference to another list; contributes nothing
    SubList,
    /// `#`, `AAL_` or `FEATURE_` annotation; contributes nothing
    Annotation,
    /// Quoted `TESTNAME=...` directive; the whole text is one entry
    Directive,
    /// No underscore: name up to the first comma
    Bare,
    /// Underscore: name up to the first underscore, quoted run options
    Qualified,
}

impl EntryRule {
    /// Pick the rule for an already normalized line. First match wins.
    pub fn classify(line: &str) -> Self {
        if line.contains("_list") {
            EntryRule::SubList
        } else if line.contains('#') || line.contains("AAL_") || line.contains("FEATURE_") {
            EntryRule::Annotation
        } else if line.contains(DIRECTIVE) {
            EntryRule::Directive
        } else if !line.contains('_') {
            EntryRule::Bare
        } else {
            EntryRule::Qualified
        }
    }

    /// Extract the `name[@options]` token for a normalized line, if any.
    pub fn extract(self, line: &str) -> Option<String> {
        let token = match self {
            EntryRule::SubList | EntryRule::Annotation => return None,
            EntryRule::Directive => line.trim().to_string(),
            EntryRule::Bare => {
                let name = line.split(',').next().unwrap_or(line).trim();
                with_options(name, first_quoted(line))
            }
            EntryRule::Qualified => {
                let name = line.split('_').next().unwrap_or(line).trim();
                with_options(name, first_quoted(line))
            }
        };
        if token.is_empty() || token.starts_with('@') {
            None
        } else {
            Some(token)
        }
    }
}

fn with_options(name: &str, options: Option<&str>) -> String {
    match options {
        Some(opts) => format!("{}@{}", name, opts),
        None => name.to_string(),
    }
}

/// First double-quoted substring. An unterminated quote runs to end of line.
fn first_quoted(line: &str) -> Option<&str> {
    line.split('"').nth(1)
}

/// Apply the cosmetic rewrites that precede classification.
fn normalize(line: &str) -> String {
    let mut line = line.to_string();
    if line.contains("COMMIT") {
        let head = line.split('+').next().unwrap_or("").to_string();
        line = head + ",";
    }
    if line.contains(DIRECTIVE) {
        if let Some(quoted) = first_quoted(&line) {
            line = quoted.to_string();
        }
    }
    if line.contains(';') {
        line = line.replace(';', ",");
    }
    line
}

/// Token contributed by one raw entry line.
pub fn entry_token(line: &str) -> Option<String> {
    if !line.contains(',') && !line.contains(';') {
        return None;
    }
    let line = normalize(line);
    let rule = EntryRule::classify(&line);
    let token = rule.extract(&line);
    debug!(?rule, ?token, "catalogue entry");
    token
}

/// Apply the entry rules to every line, in order.
pub fn parse_entries<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<TestCase> {
    lines
        .into_iter()
        .filter_map(entry_token)
        .map(|token| TestCase::parse(&token))
        .collect()
}

// ──────────────────────────────────────────────────────────
// Suite lookup
// ──────────────────────────────────────────────────────────

/// A header names the suite, holds `=`, and the character right after the
/// first occurrence of the suite name is a space.
pub fn is_suite_header(line: &str, suite: &str) -> bool {
    if suite.is_empty() || !line.contains('=') {
        return false;
    }
    match line.split_once(suite) {
        Some((_, rest)) => rest.starts_with(' '),
        None => false,
    }
}

/// Raw entry lines of `suite`, or `None` when no header matches.
pub fn suite_block<'a>(text: &'a str, suite: &str) -> Option<Vec<&'a str>> {
    let mut lines = text.lines();
    let header = lines.by_ref().find(|line| is_suite_header(line, suite))?;
    debug!("found suite header {:?}", header.split('=').next().unwrap_or("").trim());
    Some(lines.take_while(|line| !line.is_empty()).collect())
}

/// Test cases of `suite`, in catalogue order. Unknown suite → empty.
pub fn extract_suite(text: &str, suite: &str) -> Vec<TestCase> {
    match suite_block(text, suite) {
        Some(block) => parse_entries(block),
        None => Vec::new(),
    }
}

/// Flat `&&&&`-separated encoding of a case list.
pub fn join_entries(cases: &[TestCase]) -> String {
    cases
        .iter()
        .map(TestCase::encode)
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// Inverse of [`join_entries`]. Empty slots are dropped.
pub fn split_entries(flat: &str) -> Vec<TestCase> {
    flat.split(ENTRY_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .map(TestCase::parse)
        .collect()
}

// ──────────────────────────────────────────────────────────
// Catalogue files
// ──────────────────────────────────────────────────────────

/// A catalogue file loaded into memory.
#[derive(Debug, Clone)]
pub struct Catalogue {
    path: PathBuf,
    text: String,
}

impl Catalogue {
    /// Read a catalogue. A missing file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegressError::catalogue_missing(path));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegressError::from(e).with_path(path))?;
        Ok(Self::from_text(path, text))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cases of one suite.
    pub fn suite(&self, name: &str) -> Vec<TestCase> {
        extract_suite(&self.text, name)
    }

    /// Whether a header for `name` exists.
    pub fn has_suite(&self, name: &str) -> bool {
        suite_block(&self.text, name).is_some()
    }

    /// Every entry in the file, ignoring suite boundaries.
    pub fn all_entries(&self) -> Vec<TestCase> {
        parse_entries(self.text.lines())
    }

    /// Cases of a colon-separated suite list, concatenated in order.
    /// Tests listed in several suites appear several times. A suite without
    /// a header is a configuration error.
    pub fn collect_suites(&self, suites: &str) -> Result<Vec<TestCase>> {
        let mut cases = Vec::new();
        for suite in suites.split(':').filter(|s| !s.is_empty()) {
            if !self.has_suite(suite) {
                return Err(RegressError::config(format!("test suite {} not found", suite))
                    .with_path(self.path.clone()));
            }
            let found = self.suite(suite);
            info!(suite, count = found.len(), "appending tests from suite");
            cases.extend(found);
        }
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = "\
Layer3Mtu =
L3MTU1500,\"WAIT=1\"
L3MTU9000,\"WAIT=2\"

Layer3Frag =
FRAG_TEST,\"WAIT=1\"
";

    fn names(cases: &[TestCase]) -> Vec<&str> {
        cases.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_extract_suite_scenario() {
        let cases = extract_suite(CATALOGUE, "Layer3Mtu");
        assert_eq!(
            cases,
            vec![
                TestCase::new("L3MTU1500", "WAIT=1"),
                TestCase::new("L3MTU9000", "WAIT=2"),
            ]
        );
    }

    #[test]
    fn test_block_ends_at_blank_line() {
        let cases = extract_suite(CATALOGUE, "Layer3Frag");
        assert_eq!(cases, vec![TestCase::new("FRAG", "WAIT=1")]);
    }

    #[test]
    fn test_unknown_suite_is_empty() {
        assert!(extract_suite(CATALOGUE, "Layer2Basic").is_empty());
        assert!(extract_suite("", "Layer3Mtu").is_empty());
    }

    #[test]
    fn test_prefix_of_longer_name_is_not_header() {
        // "Layer3" occurs in "Layer3Mtu =" but is followed by 'M'
        assert!(!is_suite_header("Layer3Mtu = ", "Layer3"));
        assert!(extract_suite(CATALOGUE, "Layer3").is_empty());
    }

    #[test]
    fn test_header_requires_equals_and_space() {
        assert!(is_suite_header("Layer3Mtu = a,b", "Layer3Mtu"));
        assert!(!is_suite_header("Layer3Mtu a,b", "Layer3Mtu"));
        assert!(!is_suite_header("Layer3Mtu=", "Layer3Mtu"));
        assert!(!is_suite_header("x = Layer3Mtu", "Layer3Mtu"));
    }

    #[test]
    fn test_underscore_entry_with_quoted_options() {
        let cases = parse_entries(["L3_BASIC,\"WAIT=1\""]);
        assert_eq!(cases, vec![TestCase::new("L3", "WAIT=1")]);
        assert_eq!(cases[0].encode(), "L3@WAIT=1");
    }

    #[test]
    fn test_underscore_entry_without_options() {
        let cases = parse_entries(["L3Basic_ALL,"]);
        assert_eq!(cases, vec![TestCase::new("L3Basic", "")]);
    }

    #[test]
    fn test_bare_entry_name_before_first_comma() {
        let cases = parse_entries(["L2Basic,L2Other,L2Third"]);
        assert_eq!(cases, vec![TestCase::new("L2Basic", "")]);
    }

    #[test]
    fn test_lines_without_separator_are_skipped() {
        assert!(parse_entries(["L2Basic", "   ", "WAIT=1"]).is_empty());
    }

    #[test]
    fn test_semicolons_become_commas() {
        let cases = parse_entries(["L2Basic;L2Other"]);
        assert_eq!(names(&cases), vec!["L2Basic"]);
    }

    #[test]
    fn test_commit_entry_truncated_at_plus() {
        let cases = parse_entries(["L2Commit COMMIT+L2_EXTRA,\"WAIT=9\""]);
        assert_eq!(cases, vec![TestCase::new("L2Commit COMMIT", "")]);
    }

    #[test]
    fn test_sublists_and_annotations_are_skipped() {
        let lines = [
            "l2_list,l3_list",
            "#L2Basic,\"WAIT=1\"",
            "AAL_BASIC,\"WAIT=1\"",
            "FEATURE_L2,\"WAIT=1\"",
            "L2Keep,",
        ];
        assert_eq!(names(&parse_entries(lines)), vec!["L2Keep"]);
    }

    #[test]
    fn test_directive_entry_is_opaque() {
        let cases = parse_entries(["L2_DIRECTIVE,\"TESTNAME=L2Basic WAIT=2\""]);
        assert_eq!(cases, vec![TestCase::new("TESTNAME=L2Basic WAIT=2", "")]);
        assert_eq!(
            cases[0].directive(),
            Some(("L2Basic".to_string(), "WAIT=2".to_string()))
        );
    }

    #[test]
    fn test_directive_without_options() {
        let case = TestCase::new("TESTNAME=L2Basic", "");
        assert_eq!(case.directive(), Some(("L2Basic".to_string(), String::new())));
        assert_eq!(TestCase::new("L2Basic", "").directive(), None);
    }

    #[test]
    fn test_rule_precedence() {
        assert_eq!(EntryRule::classify("x_list,#"), EntryRule::SubList);
        assert_eq!(EntryRule::classify("TESTNAME=#"), EntryRule::Annotation);
        assert_eq!(EntryRule::classify("TESTNAME=A_B"), EntryRule::Directive);
        assert_eq!(EntryRule::classify("A,B"), EntryRule::Bare);
        assert_eq!(EntryRule::classify("A_B,"), EntryRule::Qualified);
    }

    #[test]
    fn test_parse_splits_at_first_at_sign() {
        assert_eq!(TestCase::parse("L3@WAIT=1@X"), TestCase::new("L3", "WAIT=1@X"));
        assert_eq!(TestCase::parse("L3"), TestCase::new("L3", ""));
    }

    #[test]
    fn test_join_split_round_trip() {
        let cases = extract_suite(CATALOGUE, "Layer3Mtu");
        let flat = join_entries(&cases);
        assert_eq!(flat, "L3MTU1500@WAIT=1&&&&L3MTU9000@WAIT=2");
        assert_eq!(split_entries(&flat), cases);
        assert_eq!(split_entries(&join_entries(&split_entries(&flat))), cases);
    }

    #[test]
    fn test_collect_suites_keeps_order_and_duplicates() {
        let catalogue = Catalogue::from_text("x.regress", CATALOGUE);
        let cases = catalogue.collect_suites("Layer3Frag:Layer3Mtu:Layer3Frag").unwrap();
        assert_eq!(names(&cases), vec!["FRAG", "L3MTU1500", "L3MTU9000", "FRAG"]);
    }

    #[test]
    fn test_collect_suites_unknown_suite() {
        let catalogue = Catalogue::from_text("x.regress", CATALOGUE);
        let err = catalogue.collect_suites("Layer3Mtu:Layer3Mtx").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Config);
        assert!(err.message.contains("Layer3Mtx"));
        assert!(catalogue.has_suite("Layer3Mtu"));
        assert!(!catalogue.has_suite("Layer3Mtx"));
    }

    #[test]
    fn test_all_entries_ignores_suite_boundaries() {
        let catalogue = Catalogue::from_text("x.regress", CATALOGUE);
        assert_eq!(
            names(&catalogue.all_entries()),
            vec!["L3MTU1500", "L3MTU9000", "FRAG"]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Catalogue::load("/nonexistent/dopplercs_paq.regress").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CatalogueMissing);
    }
}

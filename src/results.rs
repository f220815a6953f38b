//! Result-table parsing and rendering
//!
//! The test runner prints a pipe-delimited table after a `Results` marker:
//!
//! ```text
//! Results DopplerCS Test Count: 2
//! +---------------------------------------------------+
//! | L3MTU1500                                | PASSED |
//! | L3MTU9000                                | FAILED - PACKET_MISMATCH |
//! +---------------------------------------------------+
//! ```
//!
//! The table is scraped best effort: anything that does not look like a row
//! is skipped and nothing here returns an error.

use std::collections::BTreeMap;

/// Marker that precedes the table.
pub const RESULTS_MARKER: &str = "Results";

pub const PASSED: &str = "PASSED";
pub const FAILED: &str = "FAILED";
pub const FAILED_MISSING: &str = "FAILED - MISSING";
pub const FAILED_PACKET_MISMATCH: &str = "FAILED - PACKET_MISMATCH";
pub const FAILED_RUN: &str = "FAILED - RunFailed";

const TABLE_BORDER: &str = "+---------------------------------------------------+";

/// Test name → status, unique names, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    rows: BTreeMap<String, String>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row; an existing name is overwritten.
    pub fn insert(&mut self, name: impl Into<String>, status: impl Into<String>) {
        self.rows.insert(name.into(), status.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.rows.get(name).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(|k| k.as_str())
    }

    /// Rows whose status is exactly `PASSED`.
    pub fn passed_count(&self) -> usize {
        self.rows.values().filter(|s| s.as_str() == PASSED).count()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = ResultTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

/// Parse runner output. `None` when no `Results` marker is present.
pub fn parse_results(output: &str) -> Option<ResultTable> {
    let (_, table_text) = output.split_once(RESULTS_MARKER)?;
    let mut table = ResultTable::new();
    for line in table_text.lines().filter(|l| l.contains('|')) {
        let mut fields = line.split('|').skip(1);
        if let (Some(name), Some(status)) = (fields.next(), fields.next()) {
            table.insert(name.trim(), status.trim());
        }
    }
    Some(table)
}

/// Status of a simulator run from its log. The first matching line decides.
pub fn classify_log(log: &str) -> &'static str {
    for line in log.lines() {
        if line.contains("Mismatch in packets sent and received") {
            return FAILED_PACKET_MISMATCH;
        }
        if line.contains("Can't find test") {
            return FAILED_MISSING;
        }
        if line.contains("Simulation PASSED") {
            return PASSED;
        }
    }
    FAILED
}

/// Whether a unit-test log reports success. A later failure line wins.
pub fn classify_unit_log(log: &str) -> bool {
    let mut passed = false;
    for line in log.lines() {
        if line.contains("SUMMARY: PASSED") {
            passed = true;
        }
        if line.contains("FAILED (failures=") {
            passed = false;
        }
    }
    passed
}

/// Render the table printed at the end of a run.
pub fn render_results<'a>(
    label: &str,
    rows: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let rows: Vec<_> = rows.into_iter().collect();
    let mut out = String::new();
    out.push_str(&format!("{} {} Test Count: {}\n", RESULTS_MARKER, label, rows.len()));
    out.push_str(TABLE_BORDER);
    out.push('\n');
    for (name, status) in rows {
        out.push_str(&format!("| {:<40} | {:>6} |\n", name, status));
    }
    out.push_str(TABLE_BORDER);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let output = "Running...\nResults\n| L3MTU1500 | PASSED |\n| L3MTU9000 | FAILED - PACKET_MISMATCH |\n";
        let table = parse_results(output).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("L3MTU1500"), Some("PASSED"));
        assert_eq!(table.get("L3MTU9000"), Some("FAILED - PACKET_MISMATCH"));
    }

    #[test]
    fn test_no_marker_is_none() {
        assert_eq!(parse_results(""), None);
        assert_eq!(parse_results("| a | PASSED |\nresults\n"), None);
    }

    #[test]
    fn test_marker_without_rows_is_empty_table() {
        let table = parse_results("build failed\nResults\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_rows_before_marker_ignored() {
        let output = "| early | FAILED |\nResults\n| late | PASSED |\n";
        let table = parse_results(output).unwrap();
        assert_eq!(table.get("early"), None);
        assert_eq!(table.get("late"), Some("PASSED"));
    }

    #[test]
    fn test_last_write_wins() {
        let output = "Results\n| L2Basic | FAILED |\n| L2Basic | PASSED |\n";
        let table = parse_results(output).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("L2Basic"), Some("PASSED"));
    }

    #[test]
    fn test_short_rows_and_borders_ignored() {
        let output = "Results\n+-----+\n| lonely\n|   spaced   |   weird status text   | extra |\n";
        let table = parse_results(output).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("spaced"), Some("weird status text"));
    }

    #[test]
    fn test_render_then_parse() {
        let rows = [("L2Basic", "PASSED"), ("L3Basic", "FAILED - MISSING")];
        let text = render_results("DopplerCS", rows);
        assert!(text.starts_with("Results DopplerCS Test Count: 2\n"));
        let table = parse_results(&text).unwrap();
        let expected: ResultTable = rows.into_iter().collect();
        assert_eq!(table, expected);
        assert_eq!(table.passed_count(), 1);
    }

    #[test]
    fn test_classify_log() {
        assert_eq!(classify_log("boot\nSimulation PASSED\n"), PASSED);
        assert_eq!(
            classify_log("Mismatch in packets sent and received\nSimulation PASSED"),
            FAILED_PACKET_MISMATCH
        );
        assert_eq!(classify_log("Can't find test L9"), FAILED_MISSING);
        assert_eq!(classify_log("segfault"), FAILED);
    }

    #[test]
    fn test_classify_unit_log() {
        assert!(classify_unit_log("SUMMARY: PASSED\n"));
        assert!(!classify_unit_log("SUMMARY: PASSED\nFAILED (failures=2)\n"));
        assert!(!classify_unit_log(""));
    }
}

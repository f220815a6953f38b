//! Email reports
//!
//! Reports are plain text. Delivery goes through an external
//! sendmail-compatible program that reads the message on stdin.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use crate::error::{ErrorKind, RegressError, Result};
use crate::process::Invocation;
use crate::results::{ResultTable, FAILED, FAILED_RUN};
use crate::variant::HardwareVariant;
use crate::workspace::WorkspaceInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(to: &[String], from: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.to_vec(),
            from: from.to_string(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn to_rfc822(&self) -> String {
        format!(
            "To: {}\nFrom: {}\nSubject: {}\nMIME-Version: 1.0\nContent-Type: text/plain; charset=utf-8\n\n{}\n",
            self.to.join(", "),
            self.from,
            self.subject,
            self.body
        )
    }
}

/// Hands messages to the mail transfer agent.
#[derive(Debug, Clone)]
pub struct Mailer {
    /// `None` prints messages to stderr instead of sending them
    program: Option<PathBuf>,
}

impl Mailer {
    pub fn sendmail(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { program: None }
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    pub fn send(&self, message: &MailMessage) -> Result<()> {
        let Some(ref program) = self.program else {
            eprintln!("{}", message.to_rfc822());
            return Ok(());
        };
        let inv = Invocation::new(program).arg("-t");
        let mail_err = |msg: String| RegressError::new(ErrorKind::Mail, msg).with_command(inv.display());

        let done = inv
            .feed(message.to_rfc822().as_bytes())
            .map_err(|e| mail_err(format!("cannot hand over report: {}", e.message)))?;
        if !done.success {
            let code = done.code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(mail_err(format!("mailer exited with {}", code)));
        }
        info!(subject = %message.subject, to = %message.to.join(","), "report mailed");
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────
// Single-variant report
// ──────────────────────────────────────────────────────────

/// What happened to one test in a nightly run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Status reported by the runner
    Status(String),
    /// A core dump was left behind
    Crashed,
    /// The runner produced no status for the test
    RunFailed,
}

/// Everything that goes into the nightly mail.
#[derive(Debug, Clone)]
pub struct NightlyReport {
    pub variant: HardwareVariant,
    pub ported: bool,
    pub cflow: bool,
    pub memory_analysis: bool,
    pub elapsed: Duration,
    pub changes: Option<String>,
    pub workspace: WorkspaceInfo,
    pub results_dir: PathBuf,
    pub outcomes: Vec<(String, TestOutcome)>,
}

const OUTCOME_BORDER: &str =
    "+--------------------------------+--------------+------------------------------------------+";

fn outcome_row(name: &str, result: &str, note: &str) -> String {
    format!("\n| {:<35} | {:<15} | {:<40} |", name, result, note)
}

impl NightlyReport {
    pub fn subject(&self) -> String {
        let mut text = format!("Doppler SDK - {}", self.variant);
        if self.ported {
            text.push_str(" (New AFD/CAD)");
        }
        if self.cflow {
            text.push_str(" (CFLOW)");
        }
        if self.memory_analysis {
            format!("MEMORY ANALYSIS: {}", text)
        } else {
            format!("REGRESSION: {}", text)
        }
    }

    /// The per-test table, one row per outcome in name order.
    pub fn table(&self) -> String {
        let mut rows: Vec<&(String, TestOutcome)> = self.outcomes.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        out.push('\n');
        out.push_str(OUTCOME_BORDER);
        out.push_str(&outcome_row("TestName", "Result", "LogFile"));
        out.push('\n');
        out.push_str(OUTCOME_BORDER);
        for (name, outcome) in rows {
            let row = match outcome {
                TestOutcome::Crashed => outcome_row(name, FAILED, "Crashed"),
                TestOutcome::RunFailed => outcome_row(name, FAILED, "RunFailed"),
                TestOutcome::Status(status) => outcome_row(name, status, ""),
            };
            out.push_str(&row);
            if self.memory_analysis {
                out.push_str(&valgrind_excerpt(&self.results_dir, name));
            }
        }
        out.push('\n');
        out.push_str(OUTCOME_BORDER);
        out
    }

    pub fn body(&self) -> String {
        let mut body = String::from("Doppler SDK Regression Test Results\n");
        body.push_str("------ ----------------------------\n\n");
        body.push_str(&format!("Time spent: {} seconds\n", self.elapsed.as_secs()));
        if let Some(ref changes) = self.changes {
            body.push_str("Bugs fixed since last successful run:\n\n");
            body.push_str(changes);
            body.push_str("\n\n");
        }
        body.push_str(&format!("\nSDK Workspace: {}", self.workspace));
        body.push_str(&format!("\nResult Directory: {}\n", self.results_dir.display()));
        body.push_str(&self.table());
        body
    }

    pub fn message(&self, to: &[String], from: &str) -> MailMessage {
        MailMessage::new(to, from, self.subject(), self.body())
    }
}

fn valgrind_excerpt(results_dir: &Path, test: &str) -> String {
    let name = format!("{}_Valgrind.txt", test);
    match std::fs::read_to_string(results_dir.join(&name)) {
        Ok(text) => format!("\nValgrind Analysis Data: {}\n{}", name, text),
        Err(_) => format!("\nValgrind Analysis Data: {} (ERROR: File Not found)\n", name),
    }
}

// ──────────────────────────────────────────────────────────
// Multi-variant summary
// ──────────────────────────────────────────────────────────

/// Results of one variant; `None` when its run failed outright.
pub type VariantResults = (HardwareVariant, Option<ResultTable>);

/// Summary lines followed by one result column per variant.
pub fn summary_body(runs: &[VariantResults]) -> String {
    let mut body = String::from("Summary:\n");
    for (variant, table) in runs {
        match table {
            Some(t) => body.push_str(&format!("{}: {}/{}\n", variant, t.passed_count(), t.len())),
            None => body.push_str(&format!("{}: {}\n", variant, FAILED_RUN)),
        }
    }
    body.push('\n');

    let names: BTreeSet<&str> = runs
        .iter()
        .filter_map(|(_, t)| t.as_ref())
        .flat_map(|t| t.names())
        .collect();

    let mut header = format!("| {:<35} |", "Testname");
    for (variant, _) in runs {
        header.push_str(&format!(" {:<25} |", variant.label()));
    }
    body.push_str(&header);
    body.push('\n');
    for name in names {
        let mut row = format!("| {:<35} |", name);
        for (_, table) in runs {
            let status = match table {
                Some(t) => t.get(name).unwrap_or("-"),
                None => FAILED_RUN,
            };
            row.push_str(&format!(" {:<25} |", status));
        }
        body.push_str(&row);
        body.push('\n');
    }
    body.push_str("\nAll tests were run with new code, feature mode.\n");
    body
}

pub fn summary_message(to: &[String], from: &str, runs: &[VariantResults]) -> MailMessage {
    MailMessage::new(to, from, "Regression Multi-Doppler Results", summary_body(runs))
}

// ──────────────────────────────────────────────────────────
// Failure notices
// ──────────────────────────────────────────────────────────

fn failure_body(changes: &str, workspace: &WorkspaceInfo) -> String {
    format!(
        "Bugs fixed since last successful run:\n\n{}\n\nSDK Workspace: {}\n\n\n",
        changes, workspace
    )
}

pub fn pull_failed(to: &[String], from: &str) -> MailMessage {
    MailMessage::new(to, from, "REGRESSION: workspace pull failed", "")
}

/// Sent when the cron run stops on an unexpected error after the pull.
pub fn cron_aborted(to: &[String], from: &str, error: &RegressError) -> MailMessage {
    MailMessage::new(to, from, "REGRESSION: regression run aborted", format!("{}\n", error))
}

pub fn linkfarm_failed(to: &[String], from: &str, changes: &str, workspace: &WorkspaceInfo) -> MailMessage {
    MailMessage::new(
        to,
        from,
        "REGRESSION: x86_64 binos root build failed",
        failure_body(changes, workspace),
    )
}

pub fn variant_failed(
    to: &[String],
    from: &str,
    variant: HardwareVariant,
    ported: bool,
    changes: &str,
    workspace: &WorkspaceInfo,
) -> MailMessage {
    let subject = if ported {
        format!("REGRESSION: {} (new AFD/CAD) build failed", variant)
    } else {
        format!("REGRESSION: {} build failed", variant)
    };
    MailMessage::new(to, from, subject, failure_body(changes, workspace))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to() -> Vec<String> {
        vec!["team@example.com".to_string()]
    }

    fn report(outcomes: Vec<(String, TestOutcome)>) -> NightlyReport {
        NightlyReport {
            variant: HardwareVariant::CS,
            ported: true,
            cflow: false,
            memory_analysis: false,
            elapsed: Duration::from_secs(42),
            changes: Some("CSC1  by alice\n".into()),
            workspace: WorkspaceInfo::default(),
            results_dir: PathBuf::from("/r/results"),
            outcomes,
        }
    }

    #[test]
    fn test_subject_variants() {
        let mut r = report(vec![]);
        assert_eq!(r.subject(), "REGRESSION: Doppler SDK - DopplerCS (New AFD/CAD)");
        r.cflow = true;
        r.memory_analysis = true;
        assert_eq!(r.subject(), "MEMORY ANALYSIS: Doppler SDK - DopplerCS (New AFD/CAD) (CFLOW)");
    }

    #[test]
    fn test_body_table_rows() {
        let r = report(vec![
            ("L3Basic".into(), TestOutcome::RunFailed),
            ("L2Basic".into(), TestOutcome::Status("PASSED".into())),
            ("L2Crash".into(), TestOutcome::Crashed),
        ]);
        let body = r.body();
        assert!(body.contains("Time spent: 42 seconds"));
        assert!(body.contains("CSC1  by alice"));
        assert!(body.contains("SDK Workspace: none (none/none)"));
        assert!(body.contains(&format!("| {:<35} | {:<15} | {:<40} |", "L2Basic", "PASSED", "")));
        assert!(body.contains(&format!("| {:<35} | {:<15} | {:<40} |", "L3Basic", "FAILED", "RunFailed")));
        let l2 = body.find("L2Basic").unwrap();
        let l3 = body.find("L3Basic").unwrap();
        assert!(l2 < l3);
    }

    #[test]
    fn test_summary_body() {
        let cs: ResultTable = [("L2Basic", "PASSED"), ("L3Basic", "FAILED")].into_iter().collect();
        let runs = vec![(HardwareVariant::CS, Some(cs)), (HardwareVariant::D, None)];
        let body = summary_body(&runs);
        assert!(body.contains("DopplerCS: 1/2\n"));
        assert!(body.contains("DopplerD: FAILED - RunFailed\n"));
        let row = format!("| {:<35} | {:<25} | {:<25} |", "L3Basic", "FAILED", "FAILED - RunFailed");
        assert!(body.contains(&row));
    }

    #[test]
    fn test_rfc822_headers() {
        let msg = pull_failed(&to(), "regress");
        let text = msg.to_rfc822();
        assert!(text.starts_with("To: team@example.com\nFrom: regress\nSubject: REGRESSION: workspace pull failed\n"));
    }

    #[test]
    fn test_variant_failed_subject() {
        let msg = variant_failed(&to(), "r", HardwareVariant::D, true, "", &WorkspaceInfo::default());
        assert_eq!(msg.subject, "REGRESSION: DopplerD (new AFD/CAD) build failed");
    }

    #[cfg(unix)]
    #[test]
    fn test_mailer_pipes_message() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("mail.txt");
        let program = dir.path().join("sendmail");
        std::fs::write(&program, format!("#!/bin/sh\ncat > {}\n", sink.display())).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let msg = MailMessage::new(&to(), "regress", "subject line", "body text");
        Mailer::sendmail(&program).send(&msg).unwrap();
        let sent = std::fs::read_to_string(sink).unwrap();
        assert!(sent.contains("Subject: subject line\n"));
        assert!(sent.ends_with("\n\nbody text\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_mailer_failures_are_mail_errors() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("sendmail");
        std::fs::write(&program, "#!/bin/sh
exit 75
").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let msg = MailMessage::new(&to(), "regress", "s", "b");
        let err = Mailer::sendmail(&program).send(&msg).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mail);
        assert_eq!(err.message, "mailer exited with 75");

        let err = Mailer::sendmail(dir.path().join("missing")).send(&msg).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mail);
        assert!(err.message.starts_with("cannot hand over report"));
    }
}

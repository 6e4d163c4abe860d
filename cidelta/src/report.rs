//! Report sinks for finished diffs.

use async_trait::async_trait;
use cidelta_core::client::Reporter;
use cidelta_core::error::{CoreError, Result};
use cidelta_core::model::FailedTest;
use cidelta_core::sync::DiffReport;
use clap::ValueEnum;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Prints each report to stdout.
pub struct ConsoleReporter {
    format: OutputFormat,
}

impl ConsoleReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn send(&self, report: &DiffReport) -> Result<()> {
        match self.format {
            OutputFormat::Text => print!("{}", render_text(report)),
            OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
        }
        Ok(())
    }
}

/// Human-readable summary of one report.
pub fn render_text(report: &DiffReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}/{} {} vs {}: {}",
        report.root,
        report.filter,
        report.verification_build,
        report.root_build,
        if report.incomplete {
            format!("incomplete ({})", report.result)
        } else {
            report.diff.status.to_string()
        }
    );
    write_section(&mut out, "updated", &report.diff.updated);
    write_section(&mut out, "new", &report.diff.added);
    out
}

fn write_section(out: &mut String, label: &str, tests: &[FailedTest]) {
    for test in tests {
        let _ = writeln!(out, "  {label}: {test}");
        for line in test.detail.lines().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "      {line}");
        }
    }
}

/// Writes each report as `<dir>/<request-id>-<verification-job>.json`.
pub struct FileReporter {
    dir: PathBuf,
}

impl FileReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, report: &DiffReport) -> PathBuf {
        let job = report.verification_build.job.as_str().replace('/', "_");
        self.dir.join(format!("{}-{}.json", report.request_id, job))
    }
}

#[async_trait]
impl Reporter for FileReporter {
    async fn send(&self, report: &DiffReport) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::io(&self.dir, e))?;
        let path = self.path_for(report);
        let content = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| CoreError::io(&path, e))?;
        debug!("Wrote report {:?}", path);
        Ok(())
    }
}

/// Console output plus an optional report directory.
pub struct ReportSink {
    console: ConsoleReporter,
    file: Option<FileReporter>,
}

impl ReportSink {
    pub fn new(format: OutputFormat, report_dir: Option<PathBuf>) -> Self {
        Self {
            console: ConsoleReporter::new(format),
            file: report_dir.map(FileReporter::new),
        }
    }
}

#[async_trait]
impl Reporter for ReportSink {
    async fn send(&self, report: &DiffReport) -> Result<()> {
        if let Some(file) = &self.file {
            file.send(report).await?;
        }
        self.console.send(report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cidelta_core::diff::{DiffResult, DiffStatus};
    use cidelta_core::model::{BranchName, BuildReference, BuildResult, CommitId, JobName, RootName};
    use uuid::Uuid;

    fn report(incomplete: bool) -> DiffReport {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        DiffReport {
            request_id: Uuid::nil(),
            branch: BranchName::parse("main").unwrap(),
            head_commit: CommitId::parse("b".repeat(40)).unwrap(),
            reference_commit: CommitId::parse("a".repeat(40)).unwrap(),
            root: RootName::parse("core").unwrap(),
            filter: "fast".into(),
            root_build: BuildReference::new(JobName::parse("core-main").unwrap(), 7),
            verification_build: BuildReference::new(
                JobName::parse("folder/core-main-ondemand-fast").unwrap(),
                21,
            ),
            result: if incomplete {
                BuildResult::Aborted
            } else {
                BuildResult::Unstable
            },
            started_at: at,
            finished_at: at,
            incomplete,
            diff: if incomplete {
                DiffResult::default()
            } else {
                DiffResult {
                    status: DiffStatus::NEW | DiffStatus::UPDATED,
                    updated: vec![FailedTest::new("core.Db", "migrate", "deadlock\n  at line 3")],
                    added: vec![FailedTest::new("core.Api", "auth", "401")],
                }
            },
        }
    }

    #[test]
    fn text_lists_updated_then_new() {
        let text = render_text(&report(false));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "core/fast folder/core-main-ondemand-fast#21 vs core-main#7: new+updated"
        );
        assert!(lines[1].starts_with("  updated: "));
        assert!(lines[1].contains("migrate"));
        assert_eq!(lines[2], "      deadlock");
        assert_eq!(lines[3], "        at line 3");
        assert!(lines[4].starts_with("  new: "));
    }

    #[test]
    fn text_marks_incomplete_builds() {
        let text = render_text(&report(true));
        assert!(text.contains("incomplete (ABORTED)"));
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn file_reporter_writes_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let reporter = FileReporter::new(dir.path().join("reports"));
        let report = report(false);

        reporter.send(&report).await.unwrap();

        let path = reporter.path_for(&report);
        assert!(path.ends_with(format!(
            "{}-folder_core-main-ondemand-fast.json",
            Uuid::nil()
        )));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["verificationBuild"]["number"], 21);
        assert_eq!(written["diff"]["added"][0]["className"], "core.Api");
    }
}

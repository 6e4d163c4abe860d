//! Request synchronization.
//!
//! Each run polls the verification builds of every pending request, diffs
//! the finished ones against the stored baseline and hands the result to the
//! reporter. Requests whose targets are all reported are resolved and dropped.

use crate::client::{BuildServer, PARAM_REQUEST, Reporter};
use crate::config::TrackingConfig;
use crate::diff::{DiffResult, diff};
use crate::error::Result;
use crate::model::{
    Build, BuildReference, BuildResult, BranchName, CommitId, JobName, Request, RequestStatus,
    RequestTarget, RootName, TestBuild,
};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one verification build, ready for a reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub request_id: Uuid,
    pub branch: BranchName,
    pub head_commit: CommitId,
    pub reference_commit: CommitId,
    pub root: RootName,
    pub filter: String,
    pub root_build: BuildReference,
    pub verification_build: BuildReference,
    pub result: BuildResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The build ended without a usable test report; `diff` is empty.
    pub incomplete: bool,
    pub diff: DiffResult,
}

impl DiffReport {
    pub fn new(
        request: &Request,
        target: &RequestTarget,
        build: &TestBuild,
        result: BuildResult,
    ) -> Self {
        let incomplete = matches!(result, BuildResult::Aborted | BuildResult::NotBuilt);
        let diff = if incomplete {
            DiffResult::default()
        } else {
            diff(request.baseline_for(&target.root_build.job), &build.failed_tests)
        };

        Self {
            request_id: request.id,
            branch: request.branch.clone(),
            head_commit: request.head_commit.clone(),
            reference_commit: request.reference_commit.clone(),
            root: target.root.clone(),
            filter: target.filter.clone(),
            root_build: build.verifies.clone(),
            verification_build: build.reference(),
            result,
            started_at: build.started_at,
            finished_at: build.finished_at,
            incomplete,
            diff,
        }
    }
}

/// Counters for one [`Synchronizer::update`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Targets looked at.
    pub polled: usize,
    /// Targets whose build has not finished (or not started).
    pub pending: usize,
    pub reported: usize,
    pub resolved: usize,
}

pub struct Synchronizer<'a> {
    server: &'a dyn BuildServer,
    reporter: &'a dyn Reporter,
    config: &'a TrackingConfig,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        server: &'a dyn BuildServer,
        reporter: &'a dyn Reporter,
        config: &'a TrackingConfig,
    ) -> Self {
        Self {
            server,
            reporter,
            config,
        }
    }

    /// Poll every pending request once.
    ///
    /// The workspace is flushed after each request that made progress.
    pub async fn update(&self, workspace: &mut Workspace) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let leftovers: Vec<Uuid> = workspace
            .requests()
            .iter()
            .filter(|r| !r.is_pending())
            .map(|r| r.id)
            .collect();
        for id in &leftovers {
            debug!("Dropping already resolved request {}", id);
            workspace.remove_request(*id);
        }
        if !leftovers.is_empty() {
            workspace.flush().await?;
        }

        let ids: Vec<Uuid> = workspace.requests().iter().map(|r| r.id).collect();
        for id in ids {
            let Some(request) = workspace.requests_mut().iter_mut().find(|r| r.id == id) else {
                continue;
            };

            let reported_before = summary.reported;
            let outcome = self.poll_request(request, &mut summary).await;
            let resolved = outcome.is_ok() && request.try_resolve() == RequestStatus::Resolved;

            if resolved {
                info!("Request {} resolved", id);
                workspace.remove_request(id);
                summary.resolved += 1;
            }
            if resolved || summary.reported > reported_before {
                workspace.flush().await?;
            }
            outcome?;
        }

        Ok(summary)
    }

    async fn poll_request(&self, request: &mut Request, summary: &mut SyncSummary) -> Result<()> {
        for index in 0..request.targets.len() {
            let target = &request.targets[index];
            if target.reported {
                continue;
            }
            summary.polled += 1;

            let Some(build) = self
                .find_verification_build(request.id, &target.verification_job)
                .await?
            else {
                debug!(
                    "No build of {} for request {} yet",
                    target.verification_job, request.id
                );
                summary.pending += 1;
                continue;
            };
            if build.building {
                debug!(
                    "{}#{} is still running",
                    target.verification_job, build.number
                );
                summary.pending += 1;
                continue;
            }

            let failed = if build.result.has_test_report() {
                self.server
                    .get_failed_tests(&target.verification_job, build.number)
                    .await?
            } else {
                warn!(
                    "{}#{} ended {}, reporting without a diff",
                    target.verification_job, build.number, build.result
                );
                Vec::new()
            };

            let test_build = TestBuild::new(
                target.verification_job.clone(),
                &build,
                target.root_build.clone(),
                failed,
            );
            let report = DiffReport::new(request, target, &test_build, build.result);
            self.reporter.send(&report).await?;
            info!(
                "Reported {} for request {}: {}",
                report.verification_build, request.id, report.diff.status
            );

            request.targets[index].reported = true;
            summary.reported += 1;
        }
        Ok(())
    }

    /// Newest build of `job` triggered for `request_id`, within the poll window.
    async fn find_verification_build(
        &self,
        request_id: Uuid,
        job: &JobName,
    ) -> Result<Option<Build>> {
        let id = request_id.to_string();
        let builds = self.server.get_builds(job).await?;
        Ok(builds
            .into_iter()
            .take(self.config.poll_window)
            .find(|b| b.parameter(PARAM_REQUEST) == Some(id.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffStatus;
    use crate::model::FailedTest;
    use std::collections::BTreeMap;

    fn commit(n: u32) -> CommitId {
        CommitId::parse(format!("{n:040x}")).unwrap()
    }

    fn job(name: &str) -> JobName {
        JobName::parse(name).unwrap()
    }

    fn fixture(result: BuildResult) -> (Request, RequestTarget, TestBuild) {
        let mut request = Request::new(
            commit(2),
            commit(1),
            BranchName::parse("main").unwrap(),
            vec!["fast".into()],
        );
        request
            .baseline
            .insert(job("core-main"), vec![FailedTest::new("A", "t", "x")]);
        let target = RequestTarget {
            root: RootName::parse("core").unwrap(),
            filter: "fast".into(),
            root_build: BuildReference::new(job("core-main"), 5),
            root_result: BuildResult::Unstable,
            verification_job: job("core-main-ondemand-fast"),
            reported: false,
        };
        let build = Build {
            id: "8".into(),
            number: 8,
            result,
            timestamp: Utc::now(),
            duration_ms: 1_000,
            building: false,
            commits: vec![commit(2)],
            parameters: BTreeMap::new(),
        };
        let test_build = TestBuild::new(
            target.verification_job.clone(),
            &build,
            target.root_build.clone(),
            vec![FailedTest::new("A", "t", "x"), FailedTest::new("B", "u", "y")],
        );
        (request, target, test_build)
    }

    #[test]
    fn report_diffs_against_root_job_baseline() {
        let (request, target, build) = fixture(BuildResult::Unstable);
        let report = DiffReport::new(&request, &target, &build, BuildResult::Unstable);

        assert!(!report.incomplete);
        assert_eq!(report.diff.status, DiffStatus::NEW);
        assert_eq!(report.diff.added, vec![FailedTest::new("B", "u", "y")]);
        assert_eq!(report.verification_build.to_string(), "core-main-ondemand-fast#8");
        assert_eq!(report.root_build.to_string(), "core-main#5");
    }

    #[test]
    fn aborted_build_is_incomplete() {
        let (request, target, build) = fixture(BuildResult::Aborted);
        let report = DiffReport::new(&request, &target, &build, BuildResult::Aborted);
        assert!(report.incomplete);
        assert!(report.diff.status.is_empty());
        assert!(report.diff.added.is_empty());
    }

    #[test]
    fn report_serializes_camel_case() {
        let (request, target, build) = fixture(BuildResult::Success);
        let report = DiffReport::new(&request, &target, &build, BuildResult::Success);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["requestId"], request.id.to_string());
        assert_eq!(value["result"], "SUCCESS");
        assert_eq!(value["diff"]["status"], serde_json::json!(["new"]));
        assert_eq!(value["verificationBuild"]["number"], 8);
    }
}

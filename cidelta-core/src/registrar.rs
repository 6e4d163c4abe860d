//! Request registration.
//!
//! Registering a request pins a root build per root job as the baseline,
//! snapshots its failed tests and queues the verification builds. Root jobs
//! with no build of the reference commit are left out. The workspace is only
//! touched once every trigger went through.

use crate::branch::{BranchTracker, unique_root_jobs};
use crate::client::{
    BuildServer, PARAM_FILTER, PARAM_HEAD, PARAM_REFERENCE, PARAM_REQUEST, PARAM_ROOT_BUILD,
};
use crate::error::{CoreError, Result};
use crate::model::{Build, JobGroups, JobName, Request, RequestTarget, RootBuild, RootDiff};
use crate::workspace::Workspace;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub struct Registrar<'a> {
    server: &'a dyn BuildServer,
    groups: &'a JobGroups,
}

impl<'a> Registrar<'a> {
    pub fn new(server: &'a dyn BuildServer, groups: &'a JobGroups) -> Self {
        Self { server, groups }
    }

    /// Trigger the verification builds of `request` and record it.
    ///
    /// On error the workspace is left untouched. The caller flushes.
    pub async fn register(
        &self,
        workspace: &mut Workspace,
        tracker: &mut BranchTracker<'_>,
        mut request: Request,
        root_diffs: &[RootDiff],
    ) -> Result<Request> {
        if root_diffs.is_empty() {
            return Err(CoreError::NotFound(format!(
                "no verification jobs match filters {:?} on {}",
                request.filters, request.branch
            )));
        }
        if let Some(existing) = workspace
            .requests()
            .iter()
            .find(|r| r.is_pending() && r.same_subject(&request))
        {
            return Err(CoreError::Duplicate(format!(
                "request {} already verifies {} on {}",
                existing.id,
                request.head_commit.short(),
                request.branch
            )));
        }

        let mut root_builds: BTreeMap<JobName, Build> = BTreeMap::new();
        for job in unique_root_jobs(root_diffs) {
            let Some(build) = tracker
                .locate_root_build(job, &request.reference_commit)
                .await?
            else {
                warn!(
                    "Skipping {}: no finished build contains {}",
                    job,
                    request.reference_commit.short()
                );
                continue;
            };

            let root_build = RootBuild::new(job.clone(), &build, self.verification_jobs(job));
            debug!(
                "Baseline for {} is {} ({} commits, success: {})",
                job,
                root_build.reference(),
                root_build.commits.len(),
                root_build.success
            );

            let failed = self.server.get_failed_tests(job, build.number).await?;
            debug!("{} failed tests in {}", failed.len(), root_build.reference());
            request.baseline.insert(job.clone(), failed);
            root_builds.insert(job.clone(), build);
        }
        if root_builds.is_empty() {
            return Err(CoreError::NotFound(format!(
                "no finished root build contains {}",
                request.reference_commit.short()
            )));
        }

        let mut targets = Vec::with_capacity(root_diffs.len());
        for diff in root_diffs {
            let Some(build) = root_builds.get(&diff.root_job) else {
                continue;
            };
            let target = RequestTarget::new(diff, build.reference(&diff.root_job), build.result);
            self.server
                .trigger_build(&target.verification_job, &trigger_params(&request, &target))
                .await?;
            debug!(
                "Triggered {} against {}",
                target.verification_job, target.root_build
            );
            targets.push(target);
        }
        request.targets = targets;

        workspace.push_request(request.clone());
        tracker.confirm(
            workspace.branch_references_mut(),
            &request.branch,
            &request.reference_commit,
        );
        info!(
            "Registered request {} for {} on {} ({} verification builds)",
            request.id,
            request.head_commit.short(),
            request.branch,
            request.targets.len()
        );
        Ok(request)
    }

    fn verification_jobs(&self, root_job: &JobName) -> Vec<JobName> {
        self.groups
            .verification_jobs(root_job)
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Parameters passed to a triggered verification build.
pub fn trigger_params(request: &Request, target: &RequestTarget) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PARAM_REQUEST.to_string(), request.id.to_string()),
        (PARAM_HEAD.to_string(), request.head_commit.to_string()),
        (PARAM_REFERENCE.to_string(), request.reference_commit.to_string()),
        (PARAM_ROOT_BUILD.to_string(), target.root_build.to_string()),
        (PARAM_FILTER.to_string(), target.filter.clone()),
    ])
}

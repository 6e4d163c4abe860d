//! Verification requests and their lifecycle.

use super::build::{BuildReference, BuildResult};
use super::groups::RootDiff;
use super::ids::{BranchName, CommitId, JobName, RootName};
use super::test::FailedTest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Verification builds not yet reported.
    Pending,
    /// Every target diffed and reported.
    Resolved,
}

/// One verification job run on behalf of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTarget {
    pub root: RootName,
    pub filter: String,
    /// Root build providing the baseline.
    pub root_build: BuildReference,
    pub root_result: BuildResult,
    pub verification_job: JobName,
    #[serde(default)]
    pub reported: bool,
}

impl RequestTarget {
    pub fn new(diff: &RootDiff, root_build: BuildReference, root_result: BuildResult) -> Self {
        Self {
            root: diff.root.clone(),
            filter: diff.filter.clone(),
            root_build,
            root_result,
            verification_job: diff.verification_job.clone(),
            reported: false,
        }
    }
}

/// "Verify this branch's filters against this reference."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub head_commit: CommitId,
    pub reference_commit: CommitId,
    pub branch: BranchName,
    pub filters: Vec<String>,
    pub status: RequestStatus,
    /// Failed tests of the reference build, per root job.
    #[serde(default)]
    pub baseline: BTreeMap<JobName, Vec<FailedTest>>,
    #[serde(default)]
    pub targets: Vec<RequestTarget>,
}

impl Request {
    pub fn new(
        head_commit: CommitId,
        reference_commit: CommitId,
        branch: BranchName,
        filters: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            head_commit,
            reference_commit,
            branch,
            filters,
            status: RequestStatus::Pending,
            baseline: BTreeMap::new(),
            targets: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Whether `other` asks for the same verification as this request.
    pub fn same_subject(&self, other: &Request) -> bool {
        self.head_commit == other.head_commit
            && self.branch == other.branch
            && self.filters == other.filters
    }

    pub fn baseline_for(&self, root_job: &JobName) -> &[FailedTest] {
        self.baseline.get(root_job).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn outstanding_targets(&self) -> usize {
        self.targets.iter().filter(|t| !t.reported).count()
    }

    /// Move to `Resolved` once nothing is outstanding. Returns the new state.
    pub fn try_resolve(&mut self) -> RequestStatus {
        if self.is_pending() && self.outstanding_targets() == 0 {
            self.status = RequestStatus::Resolved;
        }
        self.status
    }
}

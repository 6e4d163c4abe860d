//! Collaborator contracts.
//!
//! The core talks to the build server, the local repository and the report
//! sink only through these traits. Concrete adapters live in the binary;
//! tests use in-memory mocks.

use crate::error::Result;
use crate::model::{Build, CommitId, FailedTest, JobName};
use crate::sync::DiffReport;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Build parameter carrying the request id of a triggered verification build.
pub const PARAM_REQUEST: &str = "CIDELTA_REQUEST";
/// Build parameter carrying the commit at HEAD when the request was made.
pub const PARAM_HEAD: &str = "CIDELTA_HEAD";
/// Build parameter carrying the reference commit.
pub const PARAM_REFERENCE: &str = "CIDELTA_REFERENCE";
/// Build parameter carrying the verified root build as `job#number`.
pub const PARAM_ROOT_BUILD: &str = "CIDELTA_ROOT_BUILD";
pub const PARAM_FILTER: &str = "CIDELTA_FILTER";

/// Remote build server.
#[async_trait]
pub trait BuildServer: Send + Sync {
    /// Every job name the server knows about.
    async fn list_jobs(&self) -> Result<Vec<JobName>>;

    /// Builds of `job`, newest first.
    async fn get_builds(&self, job: &JobName) -> Result<Vec<Build>>;

    /// Failed tests of one build. A build without a test report has none.
    async fn get_failed_tests(&self, job: &JobName, number: u64) -> Result<Vec<FailedTest>>;

    /// Queue a parameterized build of `job`.
    async fn trigger_build(&self, job: &JobName, params: &BTreeMap<String, String>) -> Result<()>;
}

/// Read access to the local repository.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// The last `n` commits reachable from HEAD, newest first.
    async fn last_commits(&self, n: usize) -> Result<Vec<CommitId>>;
}

/// Destination for finished diffs.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn send(&self, report: &DiffReport) -> Result<()>;
}

//! In-memory collaborators for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cidelta_core::client::{BuildServer, Reporter, VersionControl};
use cidelta_core::error::{CoreError, Result};
use cidelta_core::model::{Build, BuildResult, CommitId, FailedTest, JobName};
use cidelta_core::sync::DiffReport;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub fn commit(n: u32) -> CommitId {
    CommitId::parse(format!("{n:040x}")).unwrap()
}

pub fn job(name: &str) -> JobName {
    JobName::parse(name).unwrap()
}

fn timestamp(number: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + number as i64 * 60_000)
        .unwrap()
}

/// Finished build covering `commits`.
pub fn build(number: u64, result: BuildResult, commits: &[u32]) -> Build {
    Build {
        id: number.to_string(),
        number,
        result,
        timestamp: timestamp(number),
        duration_ms: 30_000,
        building: false,
        commits: commits.iter().map(|n| commit(*n)).collect(),
        parameters: BTreeMap::new(),
    }
}

/// Build started with `params`, as the server reports a triggered run.
pub fn triggered_build(
    number: u64,
    result: BuildResult,
    building: bool,
    params: &BTreeMap<String, String>,
) -> Build {
    Build {
        building,
        parameters: params.clone(),
        ..build(number, result, &[])
    }
}

#[derive(Default)]
struct ServerState {
    jobs: Vec<JobName>,
    builds: HashMap<JobName, Vec<Build>>,
    failed_tests: HashMap<(JobName, u64), Vec<FailedTest>>,
    triggered: Vec<(JobName, BTreeMap<String, String>)>,
    failing_trigger: Option<JobName>,
    list_jobs_calls: usize,
    get_builds_calls: HashMap<JobName, usize>,
}

/// Scriptable build server recording every call.
#[derive(Clone, Default)]
pub struct MockBuildServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockBuildServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(names: &[&str]) -> Self {
        let server = Self::new();
        server.state.lock().expect("state mutex poisoned").jobs =
            names.iter().map(|n| job(n)).collect();
        server
    }

    /// Add a build as the newest build of `job`.
    pub fn push_build(&self, job_name: &str, build: Build) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.builds.entry(job(job_name)).or_default().insert(0, build);
    }

    /// Replace a build with the same number, keeping its position.
    pub fn replace_build(&self, job_name: &str, build: Build) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        let builds = state.builds.entry(job(job_name)).or_default();
        match builds.iter().position(|b| b.number == build.number) {
            Some(index) => builds[index] = build,
            None => builds.insert(0, build),
        }
    }

    pub fn set_failed_tests(&self, job_name: &str, number: u64, tests: Vec<FailedTest>) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.failed_tests.insert((job(job_name), number), tests);
    }

    /// Make every trigger of `job` fail.
    pub fn fail_trigger(&self, job_name: &str) {
        self.state.lock().expect("state mutex poisoned").failing_trigger = Some(job(job_name));
    }

    pub fn triggered(&self) -> Vec<(JobName, BTreeMap<String, String>)> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .triggered
            .clone()
    }

    pub fn list_jobs_calls(&self) -> usize {
        self.state.lock().expect("state mutex poisoned").list_jobs_calls
    }

    pub fn get_builds_calls(&self, job_name: &str) -> usize {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .get_builds_calls
            .get(&job(job_name))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl BuildServer for MockBuildServer {
    async fn list_jobs(&self) -> Result<Vec<JobName>> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.list_jobs_calls += 1;
        Ok(state.jobs.clone())
    }

    async fn get_builds(&self, job: &JobName) -> Result<Vec<Build>> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        *state.get_builds_calls.entry(job.clone()).or_default() += 1;
        Ok(state.builds.get(job).cloned().unwrap_or_default())
    }

    async fn get_failed_tests(&self, job: &JobName, number: u64) -> Result<Vec<FailedTest>> {
        let state = self.state.lock().expect("state mutex poisoned");
        Ok(state
            .failed_tests
            .get(&(job.clone(), number))
            .cloned()
            .unwrap_or_default())
    }

    async fn trigger_build(&self, job: &JobName, params: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.failing_trigger.as_ref() == Some(job) {
            return Err(CoreError::Client(format!("trigger of {job} rejected")));
        }
        state.triggered.push((job.clone(), params.clone()));
        Ok(())
    }
}

/// Fixed local history, newest first.
pub struct MockVcs {
    commits: Vec<CommitId>,
}

impl MockVcs {
    pub fn new(commits: &[u32]) -> Self {
        Self {
            commits: commits.iter().map(|n| commit(*n)).collect(),
        }
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    async fn last_commits(&self, n: usize) -> Result<Vec<CommitId>> {
        Ok(self.commits.iter().take(n).cloned().collect())
    }
}

/// Reporter keeping every report in memory.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<DiffReport>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing mutex poisoned") = failing;
    }

    pub fn reports(&self) -> Vec<DiffReport> {
        self.reports.lock().expect("reports mutex poisoned").clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn send(&self, report: &DiffReport) -> Result<()> {
        if *self.failing.lock().expect("failing mutex poisoned") {
            return Err(CoreError::Client("report sink unavailable".into()));
        }
        self.reports
            .lock()
            .expect("reports mutex poisoned")
            .push(report.clone());
        Ok(())
    }
}

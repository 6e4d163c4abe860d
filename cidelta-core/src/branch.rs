//! Branch reference tracking.
//!
//! A branch's reference commit is the newest local commit that some root
//! build has already run on. Confirmed references are persisted per branch;
//! when none is usable the tracker guesses one from local history.

use crate::client::BuildServer;
use crate::config::TrackingConfig;
use crate::error::Result;
use crate::filters::FilterResolver;
use crate::model::{Build, BuildResult, BranchName, CommitId, JobName, RootDiff, RootName};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Relevant builds per job, fetched at most once.
#[derive(Debug)]
pub struct BuildIndex {
    window: usize,
    builds: HashMap<JobName, Vec<Build>>,
}

impl BuildIndex {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            builds: HashMap::new(),
        }
    }

    /// Whether a build can serve as a baseline.
    pub fn is_relevant(build: &Build) -> bool {
        !build.building && !matches!(build.result, BuildResult::Aborted | BuildResult::NotBuilt)
    }

    /// Finished, usable builds among the newest `window` builds of `job`, newest first.
    pub async fn relevant(&mut self, server: &dyn BuildServer, job: &JobName) -> Result<&[Build]> {
        if !self.builds.contains_key(job) {
            let builds: Vec<Build> = server
                .get_builds(job)
                .await?
                .into_iter()
                .take(self.window)
                .filter(Self::is_relevant)
                .collect();
            debug!("{} relevant builds for {}", builds.len(), job);
            self.builds.insert(job.clone(), builds);
        }
        Ok(self.builds.get(job).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Newest relevant build of `job` containing `commit`.
    pub async fn find(
        &mut self,
        server: &dyn BuildServer,
        job: &JobName,
        commit: &CommitId,
    ) -> Result<Option<&Build>> {
        let builds = self.relevant(server, job).await?;
        Ok(builds.iter().find(|b| b.contains_commit(commit)))
    }
}

/// Outcome of [`BranchTracker::try_guess_branch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchGuess {
    pub root_diffs: Vec<RootDiff>,
    pub branch: BranchName,
    pub commit: CommitId,
}

pub struct BranchTracker<'a> {
    server: &'a dyn BuildServer,
    config: &'a TrackingConfig,
    index: BuildIndex,
}

impl<'a> BranchTracker<'a> {
    pub fn new(server: &'a dyn BuildServer, config: &'a TrackingConfig) -> Self {
        Self {
            server,
            config,
            index: BuildIndex::new(config.build_window),
        }
    }

    /// Return the stored reference of `branch` if it still holds.
    ///
    /// A stored reference holds while it is among `local_commits` and some
    /// relevant build of `root_jobs` contains it. Stale entries are removed
    /// from `references`.
    pub async fn try_find_ref_commit(
        &mut self,
        references: &mut BTreeMap<BranchName, CommitId>,
        local_commits: &[CommitId],
        root_jobs: &[JobName],
        branch: &BranchName,
    ) -> Result<Option<CommitId>> {
        let Some(stored) = references.get(branch).cloned() else {
            debug!("No stored reference for {}", branch);
            return Ok(None);
        };
        if root_jobs.is_empty() {
            debug!("No root jobs to confirm reference {} of {}", stored.short(), branch);
            return Ok(None);
        }

        if local_commits.contains(&stored) {
            for job in root_jobs {
                if self.index.find(self.server, job, &stored).await?.is_some() {
                    debug!("Stored reference {} of {} is in {}", stored.short(), branch, job);
                    return Ok(Some(stored));
                }
            }
        }

        warn!("Dropping stale reference {} of {}", stored.short(), branch);
        references.remove(branch);
        Ok(None)
    }

    /// Find the nearest local commit that a root build of any candidate branch ran on.
    ///
    /// Commits are scanned newest first, bounded by `max_scan_commits`.
    /// Candidates are tried in order for each commit, so the first declared
    /// branch wins a tie.
    pub async fn try_guess_branch(
        &mut self,
        local_commits: &[CommitId],
        roots: &[RootName],
        candidates: &[BranchName],
        resolver: &FilterResolver<'_>,
    ) -> Result<Option<BranchGuess>> {
        let resolved: Vec<(&BranchName, Vec<RootDiff>)> = candidates
            .iter()
            .map(|branch| (branch, resolver.get_root_diffs(roots, branch)))
            .filter(|(branch, diffs)| {
                if diffs.is_empty() {
                    debug!("Branch {} has no root diffs", branch);
                }
                !diffs.is_empty()
            })
            .collect();
        if resolved.is_empty() {
            return Ok(None);
        }

        for commit in local_commits.iter().take(self.config.max_scan_commits) {
            for (branch, diffs) in &resolved {
                for job in unique_root_jobs(diffs) {
                    if let Some(build) = self.index.find(self.server, job, commit).await? {
                        info!(
                            "Guessed branch {} at {} (build {}#{})",
                            branch,
                            commit.short(),
                            job,
                            build.number
                        );
                        return Ok(Some(BranchGuess {
                            root_diffs: diffs.clone(),
                            branch: (*branch).clone(),
                            commit: commit.clone(),
                        }));
                    }
                }
            }
        }

        debug!(
            "No root build matched the last {} commits",
            local_commits.len().min(self.config.max_scan_commits)
        );
        Ok(None)
    }

    /// Newest relevant build of `root_job` containing `commit`.
    pub async fn locate_root_build(
        &mut self,
        root_job: &JobName,
        commit: &CommitId,
    ) -> Result<Option<Build>> {
        Ok(self.index.find(self.server, root_job, commit).await?.cloned())
    }

    /// Record `commit` as the confirmed reference of `branch`.
    pub fn confirm(
        &self,
        references: &mut BTreeMap<BranchName, CommitId>,
        branch: &BranchName,
        commit: &CommitId,
    ) {
        if references.insert(branch.clone(), commit.clone()).as_ref() != Some(commit) {
            info!("Reference of {} is now {}", branch, commit.short());
        }
    }
}

/// Root jobs of `diffs` in first-seen order.
pub fn unique_root_jobs(diffs: &[RootDiff]) -> Vec<&JobName> {
    let mut jobs: Vec<&JobName> = Vec::new();
    for diff in diffs {
        if !jobs.contains(&&diff.root_job) {
            jobs.push(&diff.root_job);
        }
    }
    jobs
}

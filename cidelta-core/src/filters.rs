//! Filter resolution.
//!
//! A filter names a family of verification jobs ("fast", "full", ...). For a
//! given branch each root maps to one root job, and each filter to at most
//! one verification job of that root job.

use crate::config::JobsConfig;
use crate::model::{BranchName, JobGroups, RootDiff, RootName};
use tracing::debug;

pub struct FilterResolver<'a> {
    groups: &'a JobGroups,
    config: &'a JobsConfig,
    filters: Vec<String>,
}

impl<'a> FilterResolver<'a> {
    pub fn new(groups: &'a JobGroups, config: &'a JobsConfig, filters: &[String]) -> Self {
        Self {
            groups,
            config,
            filters: filters.to_vec(),
        }
    }

    /// Root diffs for `roots` on `branch`, in root order then filter order.
    ///
    /// Roots without a root job on the branch, or without any verification
    /// job for the active filters, are left out.
    pub fn get_root_diffs(&self, roots: &[RootName], branch: &BranchName) -> Vec<RootDiff> {
        let mut diffs = Vec::new();

        for root in roots {
            let root_job = match self.config.root_job_name(root, branch) {
                Ok(job) => job,
                Err(e) => {
                    debug!("No root job for {} on {}: {}", root, branch, e);
                    continue;
                }
            };
            let Some(verification_jobs) = self.groups.verification_jobs(&root_job) else {
                debug!("Root job {} does not exist", root_job);
                continue;
            };

            for filter in &self.filters {
                let Ok(candidate) = self.config.verification_job_name(&root_job, filter) else {
                    continue;
                };
                if verification_jobs.contains(&candidate) {
                    diffs.push(RootDiff {
                        root: root.clone(),
                        root_job: root_job.clone(),
                        verification_job: candidate,
                        filter: filter.clone(),
                    });
                } else {
                    debug!("Root job {} has no '{}' verification job", root_job, filter);
                }
            }
        }

        diffs
    }
}

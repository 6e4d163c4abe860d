//! Job cache.
//!
//! Groups the server's job names into root jobs and the verification jobs
//! derived from them. The grouping is persisted in the workspace so later
//! invocations can skip the job listing.

use crate::client::BuildServer;
use crate::config::JobsConfig;
use crate::error::Result;
use crate::model::{JobGroups, JobName};
use crate::workspace::Workspace;
use tracing::{debug, error, info, warn};

pub struct JobCache<'a> {
    config: &'a JobsConfig,
}

impl<'a> JobCache<'a> {
    pub fn new(config: &'a JobsConfig) -> Self {
        Self { config }
    }

    /// Load the job groups, from the workspace cache when allowed.
    ///
    /// Returns `Ok(None)` when the server has no usable jobs at all.
    pub async fn try_load(
        &self,
        workspace: &mut Workspace,
        server: &dyn BuildServer,
        refresh: bool,
    ) -> Result<Option<JobGroups>> {
        if self.config.use_cache
            && !refresh
            && let Some(cached) = workspace.job_groups()
        {
            debug!("Using {} cached root jobs", cached.len());
            return Ok(self.from_names(cached.all_names()));
        }

        let names = server.list_jobs().await?;
        info!("Build server reported {} jobs", names.len());

        let groups = self.from_names(names);
        if let Some(groups) = &groups {
            workspace.set_job_groups(groups.clone());
        }
        Ok(groups)
    }

    /// Group a flat list of job names by the verification marker.
    pub fn from_names(&self, names: impl IntoIterator<Item = JobName>) -> Option<JobGroups> {
        let include = match self.config.include_regex() {
            Ok(include) => include,
            Err(e) => {
                error!("Ignoring job filter: {}", e);
                None
            }
        };

        let mut groups = JobGroups::new();
        let mut verification = Vec::new();

        for name in names {
            if let Some(include) = &include
                && !include.is_match(name.as_str())
            {
                continue;
            }
            match self.config.split_verification(name.as_str()) {
                Some((root, _)) => match JobName::parse(root) {
                    Ok(root) => verification.push((root, name)),
                    Err(e) => debug!("Skipping job {}: {}", name, e),
                },
                None => groups.insert_root(name),
            }
        }

        for (root, job) in verification {
            if !groups.insert_verification(&root, job.clone()) {
                debug!("Dropping verification job {} without root job {}", job, root);
            }
        }

        if groups.is_empty() {
            error!("No root jobs found on the build server");
            return None;
        }

        for (root, jobs) in groups.roots() {
            if jobs.is_empty() {
                warn!("Root job {} has no verification jobs", root);
            }
        }

        Some(groups)
    }
}

//! Root/verification job relationships.

use super::ids::{JobName, RootName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Root job name -> verification jobs that exercise it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobGroups(BTreeMap<JobName, BTreeSet<JobName>>);

impl JobGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root job; keeps existing verification jobs.
    pub fn insert_root(&mut self, root: JobName) {
        self.0.entry(root).or_default();
    }

    /// Attach a verification job. Returns false when `root` is unknown.
    pub fn insert_verification(&mut self, root: &JobName, verification: JobName) -> bool {
        match self.0.get_mut(root) {
            Some(jobs) => {
                jobs.insert(verification);
                true
            }
            None => false,
        }
    }

    pub fn contains_root(&self, root: &JobName) -> bool {
        self.0.contains_key(root)
    }

    pub fn verification_jobs(&self, root: &JobName) -> Option<&BTreeSet<JobName>> {
        self.0.get(root)
    }

    pub fn roots(&self) -> impl Iterator<Item = (&JobName, &BTreeSet<JobName>)> {
        self.0.iter()
    }

    /// Every job name in the groups, roots first then their verification jobs.
    pub fn all_names(&self) -> Vec<JobName> {
        self.0
            .iter()
            .flat_map(|(root, jobs)| std::iter::once(root).chain(jobs.iter()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A root paired with the verification job chosen for it under one filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDiff {
    pub root: RootName,
    pub root_job: JobName,
    pub verification_job: JobName,
    pub filter: String,
}

//! Workspace store.
//!
//! The workspace directory holds the three persisted documents. A command
//! loads them once into a [`Workspace`], hands `&mut Workspace` to the
//! components and flushes at the end; a failure before [`Workspace::flush`]
//! leaves the files on disk as they were.

use crate::error::{CoreError, Result};
use crate::model::{BranchName, CommitId, JobGroups, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const JOB_GROUPS_FILE: &str = "job-groups.json";
pub const BRANCH_REFERENCES_FILE: &str = "branch-references.json";
pub const REQUESTS_FILE: &str = "requests.json";

/// In-memory view of a workspace directory.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    job_groups: Option<JobGroups>,
    branch_references: BTreeMap<BranchName, CommitId>,
    requests: Vec<Request>,
}

impl Workspace {
    /// Load every document under `root`. Missing files read as empty state.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let job_groups: Option<JobGroups> = read_document(&root.join(JOB_GROUPS_FILE)).await?;
        let branch_references: BTreeMap<BranchName, CommitId> =
            read_document(&root.join(BRANCH_REFERENCES_FILE))
                .await?
                .unwrap_or_default();
        let requests: Vec<Request> = read_document(&root.join(REQUESTS_FILE))
            .await?
            .unwrap_or_default();

        debug!(
            "Loaded workspace {:?}: {} pending requests, {} branch references",
            root,
            requests.len(),
            branch_references.len()
        );

        Ok(Self {
            root,
            job_groups,
            branch_references,
            requests,
        })
    }

    pub fn job_groups(&self) -> Option<&JobGroups> {
        self.job_groups.as_ref()
    }

    pub fn set_job_groups(&mut self, groups: JobGroups) {
        self.job_groups = Some(groups);
    }

    pub fn branch_references(&self) -> &BTreeMap<BranchName, CommitId> {
        &self.branch_references
    }

    pub fn branch_references_mut(&mut self) -> &mut BTreeMap<BranchName, CommitId> {
        &mut self.branch_references
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn requests_mut(&mut self) -> &mut Vec<Request> {
        &mut self.requests
    }

    pub fn push_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    /// Drop a request from the active set.
    pub fn remove_request(&mut self, id: Uuid) -> Option<Request> {
        let index = self.requests.iter().position(|r| r.id == id)?;
        Some(self.requests.remove(index))
    }

    /// Write every document back atomically.
    pub async fn flush(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::io(&self.root, e))?;

        if let Some(groups) = &self.job_groups {
            write_document(&self.root.join(JOB_GROUPS_FILE), groups).await?;
        }
        write_document(
            &self.root.join(BRANCH_REFERENCES_FILE),
            &self.branch_references,
        )
        .await?;
        write_document(&self.root.join(REQUESTS_FILE), &self.requests).await?;

        debug!("Flushed workspace {:?}", self.root);
        Ok(())
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::io(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&content).map_err(|e| {
        CoreError::Invariant(format!("workspace document {} is corrupted: {e}", path.display()))
    })?;
    Ok(Some(value))
}

async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    atomic_write(path, &content).await
}

/// Write through a temp file in the same directory, then rename over `path`.
async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| CoreError::io(&temp_path, e))?;
    file.write_all(content)
        .await
        .map_err(|e| CoreError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::io(&temp_path, e))?;
    drop(file);

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| CoreError::io(path, e))
}

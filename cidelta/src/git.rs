//! Local history via the `git` command line.

use async_trait::async_trait;
use cidelta_core::client::VersionControl;
use cidelta_core::error::{CoreError, Result};
use cidelta_core::model::CommitId;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn last_commits(&self, n: usize) -> Result<Vec<CommitId>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .arg("log")
            .arg("-n")
            .arg(n.to_string())
            .arg("--format=%H")
            .output()
            .await
            .map_err(|e| CoreError::Client(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            return Err(CoreError::Client(format!(
                "git log failed in {}: {}",
                self.repo.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let commits = parse_log_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Read {} local commits", commits.len());
        Ok(commits)
    }
}

/// One commit hash per line, newest first.
pub fn parse_log_output(stdout: &str) -> Result<Vec<CommitId>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(CommitId::parse)
        .collect()
}

//! cidelta configuration.
//!
//! Loaded from a TOML file. Every section except `[server]` is optional and
//! falls back to the defaults below.

use crate::error::{CoreError, Result};
use crate::model::{BranchName, JobName, RootName};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CideltaConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the build server.
    pub url: String,
    /// User for HTTP basic auth.
    #[serde(default)]
    pub user: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Reuse the job list cached in the workspace.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Separates a root job name from a filter in verification job names.
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Root job name for a root on a branch.
    #[serde(default = "default_root_template")]
    pub root_template: String,
    /// Only job names matching this regex are considered.
    #[serde(default)]
    pub include: Option<String>,
    /// Roots verified when none are given on the command line.
    #[serde(default)]
    pub roots: Vec<RootName>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            marker: default_marker(),
            root_template: default_root_template(),
            include: None,
            roots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Branch candidates for guessing, in priority order.
    #[serde(default)]
    pub branches: Vec<BranchName>,
    /// Local commits scanned when looking for a reference.
    #[serde(default = "default_max_scan_commits")]
    pub max_scan_commits: usize,
    /// Newest root builds considered per root job.
    #[serde(default = "default_build_window")]
    pub build_window: usize,
    /// Newest verification builds polled per sync.
    #[serde(default = "default_poll_window")]
    pub poll_window: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            branches: Vec::new(),
            max_scan_commits: default_max_scan_commits(),
            build_window: default_build_window(),
            poll_window: default_poll_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_token_env() -> String {
    "CIDELTA_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_marker() -> String {
    "-ondemand-".to_string()
}

fn default_root_template() -> String {
    "{root}-{branch}".to_string()
}

fn default_max_scan_commits() -> usize {
    100
}

fn default_build_window() -> usize {
    30
}

fn default_poll_window() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CideltaConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(CoreError::Config("server.url must not be empty".into()));
        }
        self.jobs.validate()?;
        let windows = [
            ("tracking.max_scan_commits", self.tracking.max_scan_commits),
            ("tracking.build_window", self.tracking.build_window),
            ("tracking.poll_window", self.tracking.poll_window),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }
}

impl JobsConfig {
    fn validate(&self) -> Result<()> {
        if self.marker.is_empty() {
            return Err(CoreError::Config("jobs.marker must not be empty".into()));
        }
        if !self.root_template.contains("{root}") {
            return Err(CoreError::Config(
                "jobs.root_template must contain {root}".into(),
            ));
        }
        self.include_regex()?;
        Ok(())
    }

    pub fn include_regex(&self) -> Result<Option<Regex>> {
        self.include
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    CoreError::Config(format!("jobs.include is not a valid regex: {e}"))
                })
            })
            .transpose()
    }

    /// Concrete root job for `root` on `branch`.
    ///
    /// `/` in branch names is replaced by `_` since job names cannot nest.
    pub fn root_job_name(&self, root: &RootName, branch: &BranchName) -> Result<JobName> {
        let name = self
            .root_template
            .replace("{root}", root.as_str())
            .replace("{branch}", &branch.as_str().replace('/', "_"));
        JobName::parse(name)
    }

    pub fn verification_job_name(&self, root_job: &JobName, filter: &str) -> Result<JobName> {
        JobName::parse(format!("{root_job}{}{filter}", self.marker))
    }

    /// Split a verification job name into its root job and filter.
    pub fn split_verification<'a>(&self, job: &'a str) -> Option<(&'a str, &'a str)> {
        let (root, filter) = job.split_once(self.marker.as_str())?;
        if root.is_empty() || filter.is_empty() {
            return None;
        }
        Some((root, filter))
    }
}

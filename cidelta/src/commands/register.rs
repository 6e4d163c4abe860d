use crate::git::GitCli;
use crate::server::HttpBuildServer;
use anyhow::{Context, Result, anyhow, bail};
use cidelta_core::branch::{BranchTracker, unique_root_jobs};
use cidelta_core::client::{BuildServer, VersionControl};
use cidelta_core::config::CideltaConfig;
use cidelta_core::filters::FilterResolver;
use cidelta_core::jobs::JobCache;
use cidelta_core::model::{BranchName, CommitId, JobName, Request, RootDiff, RootName};
use cidelta_core::registrar::Registrar;
use cidelta_core::workspace::Workspace;
use std::path::PathBuf;
use tracing::info;

pub struct RegisterArgs {
    pub config: PathBuf,
    pub workspace: PathBuf,
    pub repo: PathBuf,
    pub branch: Option<String>,
    pub filters: Vec<String>,
    pub roots: Vec<String>,
    pub refresh_jobs: bool,
}

pub async fn run(args: RegisterArgs) -> Result<()> {
    let (config, mut workspace) = super::load(&args.config, &args.workspace).await?;
    let server = HttpBuildServer::new(&config.server)?;
    let vcs = GitCli::new(&args.repo);

    let request = register(&config, &mut workspace, &server, &vcs, &args).await?;
    workspace.flush().await?;

    println!("{}", request.id);
    Ok(())
}

async fn register(
    config: &CideltaConfig,
    workspace: &mut Workspace,
    server: &dyn BuildServer,
    vcs: &dyn VersionControl,
    args: &RegisterArgs,
) -> Result<Request> {
    let groups = JobCache::new(&config.jobs)
        .try_load(workspace, server, args.refresh_jobs)
        .await?
        .ok_or_else(|| anyhow!("the build server has no usable jobs"))?;

    let roots = if args.roots.is_empty() {
        config.jobs.roots.clone()
    } else {
        args.roots
            .iter()
            .map(RootName::parse)
            .collect::<Result<Vec<_>, _>>()?
    };
    if roots.is_empty() {
        bail!("no roots given and none configured in [jobs].roots");
    }

    let local = vcs.last_commits(config.tracking.max_scan_commits).await?;
    let head = local
        .first()
        .cloned()
        .context("the local repository has no commits")?;

    let resolver = FilterResolver::new(&groups, &config.jobs, &args.filters);
    let mut tracker = BranchTracker::new(server, &config.tracking);

    let (branch, reference, diffs) = match &args.branch {
        Some(name) => {
            let branch = BranchName::parse(name)?;
            let diffs = resolver.get_root_diffs(&roots, &branch);
            let root_jobs: Vec<JobName> = unique_root_jobs(&diffs).into_iter().cloned().collect();
            let stored = tracker
                .try_find_ref_commit(
                    workspace.branch_references_mut(),
                    &local,
                    &root_jobs,
                    &branch,
                )
                .await?;
            match stored {
                Some(commit) => (branch, commit, diffs),
                None => guess(&mut tracker, &local, &roots, &[branch], &resolver).await?,
            }
        }
        None => {
            if config.tracking.branches.is_empty() {
                bail!("no --branch given and no [tracking].branches configured");
            }
            guess(
                &mut tracker,
                &local,
                &roots,
                &config.tracking.branches,
                &resolver,
            )
            .await?
        }
    };

    info!(
        "Verifying {} on {} against {} ({} root diffs)",
        head.short(),
        branch,
        reference.short(),
        diffs.len()
    );

    let request = Request::new(head, reference, branch, args.filters.clone());
    let request = Registrar::new(server, &groups)
        .register(workspace, &mut tracker, request, &diffs)
        .await?;
    Ok(request)
}

async fn guess(
    tracker: &mut BranchTracker<'_>,
    local: &[CommitId],
    roots: &[RootName],
    candidates: &[BranchName],
    resolver: &FilterResolver<'_>,
) -> Result<(BranchName, CommitId, Vec<RootDiff>)> {
    let branch_list = candidates
        .iter()
        .map(BranchName::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if candidates
        .iter()
        .all(|branch| resolver.get_root_diffs(roots, branch).is_empty())
    {
        bail!("no verification job matches the given filters on {branch_list}");
    }

    let guess = tracker
        .try_guess_branch(local, roots, candidates, resolver)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "none of the last {} commits was built on {}",
                local.len(),
                branch_list
            )
        })?;
    Ok((guess.branch, guess.commit, guess.root_diffs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use cidelta_core::error::Result as CoreResult;
    use cidelta_core::model::{Build, BuildResult, FailedTest};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[server]
url = "http://ci"

[jobs]
roots = ["core"]

[tracking]
branches = ["main", "release"]
"#;

    fn commit(n: u32) -> CommitId {
        CommitId::parse(format!("{n:040x}")).unwrap()
    }

    fn job(name: &str) -> JobName {
        JobName::parse(name).unwrap()
    }

    fn branch(name: &str) -> BranchName {
        BranchName::parse(name).unwrap()
    }

    fn build(number: u64, commits: &[u32]) -> Build {
        Build {
            id: number.to_string(),
            number,
            result: BuildResult::Success,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            duration_ms: 1_000,
            building: false,
            commits: commits.iter().map(|n| commit(*n)).collect(),
            parameters: BTreeMap::new(),
        }
    }

    #[derive(Default)]
    struct FakeServer {
        builds: HashMap<JobName, Vec<Build>>,
        triggered: Mutex<Vec<JobName>>,
    }

    impl FakeServer {
        fn with_build(mut self, job_name: &str, build: Build) -> Self {
            self.builds.entry(job(job_name)).or_default().insert(0, build);
            self
        }

        fn triggered(&self) -> Vec<String> {
            self.triggered
                .lock()
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect()
        }
    }

    #[async_trait]
    impl BuildServer for FakeServer {
        async fn list_jobs(&self) -> CoreResult<Vec<JobName>> {
            Ok([
                "core-main",
                "core-main-ondemand-fast",
                "core-release",
                "core-release-ondemand-fast",
                "ui-main",
                "ui-main-ondemand-fast",
            ]
            .into_iter()
            .map(job)
            .collect())
        }

        async fn get_builds(&self, job: &JobName) -> CoreResult<Vec<Build>> {
            Ok(self.builds.get(job).cloned().unwrap_or_default())
        }

        async fn get_failed_tests(&self, _: &JobName, _: u64) -> CoreResult<Vec<FailedTest>> {
            Ok(Vec::new())
        }

        async fn trigger_build(
            &self,
            job: &JobName,
            _: &BTreeMap<String, String>,
        ) -> CoreResult<()> {
            self.triggered.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    struct FakeVcs(Vec<CommitId>);

    #[async_trait]
    impl VersionControl for FakeVcs {
        async fn last_commits(&self, n: usize) -> CoreResult<Vec<CommitId>> {
            Ok(self.0.iter().take(n).cloned().collect())
        }
    }

    /// HEAD first: c5, c4, c3, c2, c1.
    fn history() -> FakeVcs {
        FakeVcs((1..=5).rev().map(commit).collect())
    }

    fn args(branch: Option<&str>, filters: &[&str], roots: &[&str]) -> RegisterArgs {
        RegisterArgs {
            config: PathBuf::new(),
            workspace: PathBuf::new(),
            repo: PathBuf::new(),
            branch: branch.map(str::to_string),
            filters: filters.iter().map(|f| f.to_string()).collect(),
            roots: roots.iter().map(|r| r.to_string()).collect(),
            refresh_jobs: false,
        }
    }

    async fn workspace(dir: &TempDir) -> Workspace {
        Workspace::load(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn stored_reference_is_reused_for_given_branch() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        ws.branch_references_mut().insert(branch("main"), commit(2));
        let server = FakeServer::default()
            .with_build("core-main", build(1, &[2]))
            .with_build("core-main", build(2, &[4]));

        let cli = args(Some("main"), &["fast"], &[]);
        let request = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap();

        assert_eq!(request.reference_commit, commit(2));
        assert_eq!(request.branch, branch("main"));
        assert_eq!(server.triggered(), vec!["core-main-ondemand-fast"]);
        assert_eq!(ws.requests().len(), 1);
    }

    #[tokio::test]
    async fn stale_reference_falls_back_to_guess_on_that_branch() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        ws.branch_references_mut().insert(branch("main"), commit(42));
        let server = FakeServer::default()
            .with_build("core-main", build(1, &[3]))
            .with_build("core-release", build(1, &[5]));

        let cli = args(Some("main"), &["fast"], &[]);
        let request = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap();

        assert_eq!(request.branch, branch("main"));
        assert_eq!(request.reference_commit, commit(3));
        assert_eq!(ws.branch_references().get(&branch("main")), Some(&commit(3)));
    }

    #[tokio::test]
    async fn branch_is_guessed_from_configured_candidates() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        let server = FakeServer::default()
            .with_build("core-main", build(1, &[3]))
            .with_build("core-release", build(1, &[4]));

        let cli = args(None, &["fast"], &[]);
        let request = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap();

        assert_eq!(request.branch, branch("release"));
        assert_eq!(request.reference_commit, commit(4));
        assert_eq!(server.triggered(), vec!["core-release-ondemand-fast"]);
    }

    #[tokio::test]
    async fn root_flag_overrides_configured_roots() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        let server = FakeServer::default()
            .with_build("core-main", build(1, &[4]))
            .with_build("ui-main", build(1, &[4]));

        let cli = args(Some("main"), &["fast"], &["ui"]);
        let request = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap();

        assert_eq!(server.triggered(), vec!["ui-main-ondemand-fast"]);
        assert_eq!(request.targets[0].root.as_str(), "ui");
    }

    #[tokio::test]
    async fn empty_history_is_an_error() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        let server = FakeServer::default().with_build("core-main", build(1, &[4]));

        let cli = args(Some("main"), &["fast"], &[]);
        let err = register(&config, &mut ws, &server, &FakeVcs(Vec::new()), &cli)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no commits"));
        assert!(server.triggered().is_empty());
    }

    #[tokio::test]
    async fn roots_are_required_from_config_or_flags() {
        let config = CideltaConfig::from_toml_str("[server]\nurl = \"http://ci\"\n").unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        let server = FakeServer::default();

        let cli = args(Some("main"), &["fast"], &[]);
        let err = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no roots"));
    }

    #[tokio::test]
    async fn unmatched_filter_is_reported_as_such() {
        let config = CideltaConfig::from_toml_str(CONFIG).unwrap();
        let dir = TempDir::new().unwrap();
        let mut ws = workspace(&dir).await;
        let server = FakeServer::default().with_build("core-main", build(1, &[4]));

        let cli = args(Some("main"), &["lint"], &[]);
        let err = register(&config, &mut ws, &server, &history(), &cli)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no verification job matches"));
        assert!(err.to_string().contains("main"));
        assert!(ws.requests().is_empty());
    }
}

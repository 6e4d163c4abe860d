//! HTTP build-server client.
//!
//! Speaks the small JSON subset of the Jenkins remote API that cidelta needs:
//! job listing, build history, test reports and parameterized triggers.

use async_trait::async_trait;
use cidelta_core::client::BuildServer;
use cidelta_core::config::ServerConfig;
use cidelta_core::error::{CoreError, Result};
use cidelta_core::model::{Build, FailedTest, JobName};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const BUILD_TREE: &str = "builds[id,number,result,timestamp,duration,building,\
changeSets[items[commitId]],actions[parameters[name,value]]]";

/// Case states the server uses for failures.
const FAILED_STATES: [&str; 2] = ["FAILED", "REGRESSION"];

pub struct HttpBuildServer {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl HttpBuildServer {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Client(format!("failed to build HTTP client: {e}")))?;

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        let auth = match (&config.user, token) {
            (Some(user), Some(token)) => Some((user.clone(), token)),
            (Some(user), None) => {
                debug!(
                    "{} is not set, talking to the server as {} without a token",
                    config.token_env, user
                );
                None
            }
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn job_url(&self, job: &JobName) -> String {
        format!("{}/job/{}", self.base_url, urlencoding::encode(job.as_str()))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, token)) => request.basic_auth(user, Some(token)),
            None => request,
        }
    }

    /// GET `url` as JSON. A 404 yields `None`.
    async fn get_json(&self, url: &str) -> Result<Option<Value>> {
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| CoreError::Client(format!("GET {url} failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| CoreError::Client(format!("GET {url} failed: {e}")))?;
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| CoreError::Client(format!("GET {url} returned invalid JSON: {e}")))?;
        Ok(Some(value))
    }

    async fn require_json(&self, url: &str) -> Result<Value> {
        self.get_json(url)
            .await?
            .ok_or_else(|| CoreError::Client(format!("GET {url} returned 404")))
    }
}

#[async_trait]
impl BuildServer for HttpBuildServer {
    async fn list_jobs(&self) -> Result<Vec<JobName>> {
        let url = format!("{}/api/json?tree=jobs[name]", self.base_url);
        parse_job_list(&self.require_json(&url).await?)
    }

    async fn get_builds(&self, job: &JobName) -> Result<Vec<Build>> {
        let url = format!(
            "{}/api/json?tree={}",
            self.job_url(job),
            urlencoding::encode(BUILD_TREE)
        );
        parse_builds(&self.require_json(&url).await?)
    }

    async fn get_failed_tests(&self, job: &JobName, number: u64) -> Result<Vec<FailedTest>> {
        let url = format!("{}/{}/testReport/api/json", self.job_url(job), number);
        match self.get_json(&url).await? {
            Some(report) => Ok(parse_failed_tests(&report)),
            None => {
                debug!("{}#{} has no test report", job, number);
                Ok(Vec::new())
            }
        }
    }

    async fn trigger_build(&self, job: &JobName, params: &BTreeMap<String, String>) -> Result<()> {
        let url = format!(
            "{}/buildWithParameters?{}",
            self.job_url(job),
            encode_params(params)
        );
        debug!("POST {}", url);
        self.authorize(self.client.post(&url))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CoreError::Client(format!("triggering {job} failed: {e}")))?;
        Ok(())
    }
}

fn encode_params(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn parse_job_list(value: &Value) -> Result<Vec<JobName>> {
    let jobs = value
        .get("jobs")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::validation("jobs", "job listing has no jobs array"))?;

    let mut names = Vec::with_capacity(jobs.len());
    for entry in jobs {
        match entry.get("name").and_then(Value::as_str).map(JobName::parse) {
            Some(Ok(name)) => names.push(name),
            Some(Err(e)) => debug!("Skipping job entry: {}", e),
            None => debug!("Skipping job entry without a name"),
        }
    }
    Ok(names)
}

/// Builds from a job's build listing, newest first.
///
/// The server reports a null result while a build is running; such builds
/// are read as `NOT_BUILT`.
pub fn parse_builds(value: &Value) -> Result<Vec<Build>> {
    let entries = value
        .get("builds")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::validation("builds", "build listing has no builds array"))?;

    let mut builds = entries
        .iter()
        .map(|entry| {
            let building = entry.get("building").and_then(Value::as_bool) == Some(true);
            if building && entry.get("result").is_none_or(Value::is_null) {
                let mut entry = entry.clone();
                entry["result"] = Value::from("NOT_BUILT");
                Build::from_json(&entry)
            } else {
                Build::from_json(entry)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    builds.sort_by(|a, b| b.number.cmp(&a.number));
    Ok(builds)
}

/// Failing cases of a test report.
pub fn parse_failed_tests(report: &Value) -> Vec<FailedTest> {
    let cases = report
        .get("suites")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|suite| suite.get("cases").and_then(Value::as_array))
        .flatten();

    cases
        .filter(|case| {
            case.get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| FAILED_STATES.contains(&s))
        })
        .map(|case| {
            let field = |name: &str| {
                case.get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            FailedTest::new(field("className"), field("name"), field("errorDetails"))
        })
        .collect()
}

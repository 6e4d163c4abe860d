//! Build records as reported by the build server.

use super::ids::{CommitId, JobName};
use super::test::FailedTest;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildResult {
    Success,
    Failure,
    Aborted,
    Unstable,
    NotBuilt,
}

/// Two-way mapping between results and their wire strings, in ordinal order.
const RESULT_TABLE: [(BuildResult, &str); 5] = [
    (BuildResult::Success, "SUCCESS"),
    (BuildResult::Failure, "FAILURE"),
    (BuildResult::Aborted, "ABORTED"),
    (BuildResult::Unstable, "UNSTABLE"),
    (BuildResult::NotBuilt, "NOT_BUILT"),
];

impl BuildResult {
    pub const ALL: [BuildResult; 5] = [
        BuildResult::Success,
        BuildResult::Failure,
        BuildResult::Aborted,
        BuildResult::Unstable,
        BuildResult::NotBuilt,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Aborted => 2,
            Self::Unstable => 3,
            Self::NotBuilt => 4,
        }
    }

    pub fn as_wire(self) -> &'static str {
        RESULT_TABLE[usize::from(self.ordinal())].1
    }

    /// Parse a wire string; unknown values are validation errors.
    pub fn parse(raw: &str) -> Result<Self> {
        RESULT_TABLE
            .iter()
            .find(|(_, wire)| *wire == raw)
            .map(|(result, _)| *result)
            .ok_or_else(|| {
                CoreError::validation("result", format!("unrecognized build result '{raw}'"))
            })
    }

    /// Recover a result from its stored ordinal.
    ///
    /// Out-of-range ordinals only come from corrupted workspace state.
    pub fn from_ordinal(ordinal: u64) -> Result<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| RESULT_TABLE.get(index))
            .map(|(result, _)| *result)
            .ok_or_else(|| {
                CoreError::Invariant(format!(
                    "stored build result ordinal {ordinal} is out of range"
                ))
            })
    }

    /// Whether a build with this result produced a usable test report.
    pub fn has_test_report(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Unstable)
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for BuildResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for BuildResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Wire(String),
            Ordinal(u64),
        }

        match Stored::deserialize(deserializer)? {
            Stored::Wire(raw) => BuildResult::parse(&raw),
            Stored::Ordinal(ordinal) => BuildResult::from_ordinal(ordinal),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Identifies a build without fetching it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildReference {
    pub job: JobName,
    pub number: u64,
}

impl BuildReference {
    pub fn new(job: JobName, number: u64) -> Self {
        Self { job, number }
    }
}

impl fmt::Display for BuildReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.job, self.number)
    }
}

/// A single build of some job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub id: String,
    pub number: u64,
    pub result: BuildResult,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub building: bool,
    /// Commits of the first non-empty change-set group.
    pub commits: Vec<CommitId>,
    /// Parameters the build was started with.
    pub parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct WireBuild {
    id: Option<String>,
    number: Option<u64>,
    result: Option<String>,
    timestamp: Option<i64>,
    duration: Option<u64>,
    building: Option<bool>,
    #[serde(rename = "changeSets", default)]
    change_sets: Vec<WireChangeSet>,
    #[serde(default)]
    actions: Vec<Option<WireAction>>,
}

#[derive(Deserialize)]
struct WireChangeSet {
    #[serde(default)]
    items: Vec<WireChange>,
}

#[derive(Deserialize)]
struct WireChange {
    #[serde(rename = "commitId")]
    commit_id: String,
}

#[derive(Deserialize)]
struct WireAction {
    #[serde(default)]
    parameters: Vec<WireParameter>,
}

#[derive(Deserialize)]
struct WireParameter {
    name: String,
    #[serde(default)]
    value: Value,
}

impl Build {
    /// Decode the build-server wire shape.
    ///
    /// `id` and `result` are mandatory; every other field falls back to a
    /// neutral default.
    pub fn from_json(value: &Value) -> Result<Self> {
        let wire: WireBuild = serde_json::from_value(value.clone())
            .map_err(|e| CoreError::validation("build", e.to_string()))?;

        let id = wire
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CoreError::validation("id", "build id is missing"))?;
        let result = wire
            .result
            .ok_or_else(|| CoreError::validation("result", "build result is missing"))?;
        let result = BuildResult::parse(&result)?;

        let millis = wire.timestamp.unwrap_or(0);
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            CoreError::validation("timestamp", format!("{millis} is out of range"))
        })?;

        let commits = wire
            .change_sets
            .into_iter()
            .find(|set| !set.items.is_empty())
            .map(|set| {
                set.items
                    .into_iter()
                    .map(|change| CommitId::parse(&change.commit_id))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let parameters = wire
            .actions
            .into_iter()
            .flatten()
            .flat_map(|action| action.parameters)
            .map(|param| {
                let value = match param.value {
                    Value::String(text) => text,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (param.name, value)
            })
            .collect();

        Ok(Self {
            id,
            number: wire.number.unwrap_or(0),
            result,
            timestamp,
            duration_ms: wire.duration.unwrap_or(0),
            building: wire.building.unwrap_or(false),
            commits,
            parameters,
        })
    }

    /// Encode back into the wire shape accepted by [`Build::from_json`].
    pub fn to_json(&self) -> Value {
        let items: Vec<Value> = self
            .commits
            .iter()
            .map(|commit| json!({ "commitId": commit }))
            .collect();
        let change_sets = if items.is_empty() {
            Vec::new()
        } else {
            vec![json!({ "items": items })]
        };

        let mut value = json!({
            "id": self.id,
            "number": self.number,
            "result": self.result.as_wire(),
            "timestamp": self.timestamp.timestamp_millis(),
            "duration": self.duration_ms,
            "building": self.building,
            "changeSets": change_sets,
        });

        if !self.parameters.is_empty() {
            let parameters: Vec<Value> = self
                .parameters
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();
            value["actions"] = json!([{ "parameters": parameters }]);
        }
        value
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        let duration = i64::try_from(self.duration_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or_else(Duration::zero);
        self.timestamp
            .checked_add_signed(duration)
            .unwrap_or(self.timestamp)
    }

    pub fn is_success(&self) -> bool {
        self.result == BuildResult::Success
    }

    pub fn contains_commit(&self, commit: &CommitId) -> bool {
        self.commits.contains(commit)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn reference(&self, job: &JobName) -> BuildReference {
        BuildReference::new(job.clone(), self.number)
    }
}

/// Baseline build of a root job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootBuild {
    pub job: JobName,
    pub id: String,
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub commits: Vec<CommitId>,
    pub verification_jobs: Vec<JobName>,
}

impl RootBuild {
    pub fn new(job: JobName, build: &Build, verification_jobs: Vec<JobName>) -> Self {
        Self {
            job,
            id: build.id.clone(),
            number: build.number,
            started_at: build.timestamp,
            finished_at: build.end_time(),
            success: build.is_success(),
            commits: build.commits.clone(),
            verification_jobs,
        }
    }

    pub fn reference(&self) -> BuildReference {
        BuildReference::new(self.job.clone(), self.number)
    }
}

/// Completed verification build with its failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBuild {
    pub job: JobName,
    pub id: String,
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub verifies: BuildReference,
    pub failed_tests: Vec<FailedTest>,
}

impl TestBuild {
    pub fn new(
        job: JobName,
        build: &Build,
        verifies: BuildReference,
        failed_tests: Vec<FailedTest>,
    ) -> Self {
        Self {
            job,
            id: build.id.clone(),
            number: build.number,
            started_at: build.timestamp,
            finished_at: build.end_time(),
            success: build.is_success(),
            verifies,
            failed_tests,
        }
    }

    pub fn reference(&self) -> BuildReference {
        BuildReference::new(self.job.clone(), self.number)
    }
}

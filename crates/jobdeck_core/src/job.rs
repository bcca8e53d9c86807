use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Paused,
    Finished,
}

impl JobStatus {
    /// Finished and Paused jobs are never polled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Finished)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Paused => "Stopped",
            JobStatus::Finished => "Finished",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status payload of one job as reported by `GET /job/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(default)]
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl JobSnapshot {
    pub fn new(id: impl Into<String>, status: JobStatus, percent: f64) -> Self {
        Self {
            id: id.into(),
            status,
            percent,
            error: None,
            desc: None,
            updated: None,
        }
    }

    /// Fills a missing id, clamps the percent into `0..=1` and keeps a
    /// running job's progress from moving backwards.
    pub fn normalized(mut self, id: &str, previous: Option<&JobSnapshot>) -> Self {
        if self.id.is_empty() {
            self.id = id.to_string();
        }
        self.percent = if self.percent.is_finite() {
            self.percent.clamp(0.0, 1.0)
        } else {
            0.0
        };
        // Progress never moves backwards while the job keeps running.
        if let Some(previous) = previous {
            if previous.status == JobStatus::Running && self.status == JobStatus::Running {
                self.percent = self.percent.max(previous.percent);
            }
        }
        self
    }
}

/// One row of `GET /job/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Job category as reported by the service, e.g. `"import"`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub status: JobStatus,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl JobItem {
    /// Copies live progress from a tracked job into a list row.
    pub fn apply_snapshot(&self, snapshot: &JobSnapshot) -> JobItem {
        let mut next = self.clone();
        next.percent = snapshot.percent;
        if let Some(updated) = &snapshot.updated {
            next.updated = updated.clone();
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Finished,
    Paused,
    /// Polling gave up after too many consecutive failed status requests.
    /// The remote job may still be running.
    Abandoned,
}

impl FinishReason {
    pub fn from_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Running => None,
            JobStatus::Paused => Some(FinishReason::Paused),
            JobStatus::Finished => Some(FinishReason::Finished),
        }
    }
}

/// A short user-facing message about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
    pub text: Vec<String>,
}

impl Tip {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Tip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text.join(": "))
    }
}

/// Status polling cadence and failure tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Delay multiplier per consecutive failure; `1` keeps a fixed cadence.
    pub backoff_factor: u32,
    pub max_interval: Duration,
    /// `None` polls forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            backoff_factor: 1,
            max_interval: Duration::from_secs(30),
            max_consecutive_failures: None,
        }
    }
}

impl PollPolicy {
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        if failures == 0 || self.backoff_factor <= 1 {
            return self.interval;
        }
        let multiplier = self.backoff_factor.saturating_pow(failures);
        self.interval
            .saturating_mul(multiplier)
            .min(self.max_interval.max(self.interval))
    }
}

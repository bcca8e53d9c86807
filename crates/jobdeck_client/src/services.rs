use std::sync::Arc;

use jobdeck_core::{
    normalize, ApiError, JobItem, JobSnapshot, JobStatus, ListParams, PaginatedResult,
};
use jobdeck_logging::{jobdeck_info, jobdeck_warn};
use serde::Deserialize;
use serde_json::Value;

use crate::{EndpointFetcher, ListController, Transport};

pub const JOB_LIST_ENDPOINT: &str = "/job/list";
const CLEAR_EXPIRED_ENDPOINT: &str = "/job/clear_expired";

/// Builds `/job/{id}{suffix}`, rejecting ids that would escape the segment.
fn job_path(id: &str, suffix: &str) -> Result<String, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation("job id is empty".to_string()));
    }
    if id.contains(['/', '?', '#']) {
        return Err(ApiError::Validation(format!("job id {id:?} is not a path segment")));
    }
    Ok(format!("/job/{id}{suffix}"))
}

fn into_result<T>(page: PaginatedResult<T>) -> Result<PaginatedResult<T>, ApiError> {
    match page.error.clone() {
        Some(error) => Err(error),
        None => Ok(page),
    }
}

/// One page of the current user's jobs.
pub async fn fetch_job_list(
    transport: &dyn Transport,
    params: &ListParams,
) -> Result<PaginatedResult<JobItem>, ApiError> {
    let raw = transport.get(JOB_LIST_ENDPOINT, params).await?;
    into_result(normalize(Some(&raw)))
}

/// Paginated controller over `GET /job/list`.
pub fn job_list_controller(transport: Arc<dyn Transport>, page_size: u32) -> ListController<JobItem> {
    ListController::new(
        Arc::new(EndpointFetcher::new(transport, JOB_LIST_ENDPOINT)),
        page_size,
    )
}

pub async fn fetch_job_status(transport: &dyn Transport, id: &str) -> Result<JobSnapshot, ApiError> {
    let path = job_path(id, "/status")?;
    let raw = transport.get(&path, &ListParams::new()).await?;
    let mut snapshot: JobSnapshot = serde_json::from_value(raw)
        .map_err(|err| ApiError::malformed(format!("status of job {id}: {err}")))?;
    if snapshot.id.is_empty() {
        snapshot.id = id.trim().to_string();
    }
    Ok(snapshot)
}

/// Asks the service to stop a running job. Subsequent status checks are
/// expected to report it as paused.
pub async fn pause_job(transport: &dyn Transport, id: &str) -> Result<(), ApiError> {
    let path = job_path(id, "/pause")?;
    let query = ListParams::from([("force".to_string(), "1".to_string())]);
    transport.get(&path, &query).await?;
    jobdeck_info!("Pause requested for job {}", id);
    Ok(())
}

/// Drops stale job records on the service. Locally tracked ids are left
/// alone; they are pruned only by observing a terminal status.
pub async fn clear_expired_jobs(transport: &dyn Transport) -> Result<(), ApiError> {
    transport.get(CLEAR_EXPIRED_ENDPOINT, &ListParams::new()).await?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct LogRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created: String,
}

/// One decoded line of a job's output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLogLine {
    pub id: String,
    pub created: String,
    pub fields: Value,
}

pub async fn fetch_job_logs(
    transport: &dyn Transport,
    job_id: &str,
    page: u32,
    page_size: u32,
) -> Result<PaginatedResult<JobLogLine>, ApiError> {
    let path = job_path(job_id, "/logs")?;
    let query = ListParams::from([
        ("page".to_string(), page.to_string()),
        ("page_size".to_string(), page_size.to_string()),
    ]);
    let raw = transport.get(&path, &query).await?;
    let records = into_result(normalize::<LogRecord>(Some(&raw)))?;

    let lines = records
        .data_source
        .into_iter()
        .filter_map(|record| match serde_json::from_str::<Value>(&record.content) {
            Ok(fields) => Some(JobLogLine {
                id: record.id,
                created: record.created,
                fields,
            }),
            Err(err) => {
                jobdeck_warn!("Skipping undecodable log line {} of job {}: {}", record.id, job_id, err);
                None
            }
        })
        .collect();

    Ok(PaginatedResult {
        data_source: lines,
        page: records.page,
        page_size: records.page_size,
        total: records.total,
        empty: records.empty,
        no_more: records.no_more,
        next_marker: records.next_marker,
        error: None,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    desc: String,
    status: JobStatus,
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    created: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobProfile {
    pub id: String,
    pub desc: String,
    pub status: JobStatus,
    /// Output lines that decoded as JSON, in order.
    pub content: Vec<Value>,
    pub created: String,
}

pub async fn fetch_job_profile(transport: &dyn Transport, id: &str) -> Result<JobProfile, ApiError> {
    let path = job_path(id, "")?;
    let raw = transport.get(&path, &ListParams::new()).await?;
    let payload: ProfilePayload = serde_json::from_value(raw)
        .map_err(|err| ApiError::malformed(format!("profile of job {id}: {err}")))?;

    let content = payload
        .lines
        .iter()
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(_) => {
                jobdeck_warn!("Dropping non-JSON output line of job {}: {}", id, line);
                None
            }
        })
        .collect();

    Ok(JobProfile {
        id: id.trim().to_string(),
        desc: payload.desc,
        status: payload.status,
        content,
        created: payload.created,
    })
}

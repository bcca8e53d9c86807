use crate::{ApiError, JobSnapshot, ListParams, PaginatedResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ListMsg<T> {
    /// First load of page 1 with the current params.
    Init,
    /// Request the page after the current one and append it.
    LoadMore,
    /// Reload page 1 with the current params.
    Refresh,
    /// Merge filter params, then reload page 1.
    Search(ListParams),
    /// The in-flight fetch returned a normalized page.
    Loaded(PaginatedResult<T>),
    /// The in-flight fetch failed.
    Failed(ApiError),
    /// The in-flight fetch was abandoned before it answered.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobMsg {
    /// Caller asked to wait for the job to finish.
    StartPolling,
    /// One-shot status check; becomes the baseline without emitting.
    SnapshotCached(JobSnapshot),
    /// A polling tick returned a status.
    StatusFetched(JobSnapshot),
    /// A polling tick failed.
    StatusFailed(ApiError),
    /// Entity discarded before (or after) reaching a terminal state.
    Dispose,
}

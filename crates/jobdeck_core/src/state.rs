use std::collections::BTreeMap;

use crate::{ApiError, JobSnapshot, JobStatus, PollPolicy, DEFAULT_PAGE_SIZE};

/// Filter and pagination parameters sent as query pairs.
pub type ListParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Page 1; the result replaces the data source.
    Replace,
    /// Next page; the result is appended.
    Append,
}

/// What a list view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse<T> {
    pub data_source: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub empty: bool,
    pub no_more: bool,
    pub loading: bool,
    /// Nothing has been loaded successfully yet.
    pub initial: bool,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone)]
pub struct ListState<T> {
    pub(crate) phase: ListPhase,
    pub(crate) params: ListParams,
    pub(crate) data_source: Vec<T>,
    pub(crate) page: u32,
    pub(crate) page_size: u32,
    pub(crate) total: u64,
    pub(crate) empty: bool,
    pub(crate) no_more: bool,
    pub(crate) next_marker: Option<String>,
    pub(crate) initial: bool,
    pub(crate) error: Option<ApiError>,
    pub(crate) pending: Option<(FetchMode, u32)>,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl<T> ListState<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            phase: ListPhase::Idle,
            params: ListParams::new(),
            data_source: Vec::new(),
            page: 1,
            page_size: page_size.max(1),
            total: 0,
            empty: false,
            no_more: false,
            next_marker: None,
            initial: true,
            error: None,
            pending: None,
        }
    }

    pub fn with_params(params: ListParams, page_size: u32) -> Self {
        Self {
            params,
            ..Self::new(page_size)
        }
    }

    pub fn phase(&self) -> ListPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn params(&self) -> &ListParams {
        &self.params
    }

    pub fn data_source(&self) -> &[T] {
        &self.data_source
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn no_more(&self) -> bool {
        self.no_more
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Rewrites every loaded item in place, e.g. to patch in live progress.
    pub fn modify_data_source<F>(&mut self, updater: F)
    where
        F: FnMut(T) -> T,
    {
        let items = std::mem::take(&mut self.data_source);
        self.data_source = items.into_iter().map(updater).collect();
    }

    pub(crate) fn request_params(&self, mode: FetchMode, page: u32) -> ListParams {
        let mut params = self.params.clone();
        params.insert("page".to_string(), page.to_string());
        params.insert("page_size".to_string(), self.page_size.to_string());
        if mode == FetchMode::Append {
            if let Some(marker) = &self.next_marker {
                params.insert("next_marker".to_string(), marker.clone());
            }
        }
        params
    }
}

impl<T: Clone> ListState<T> {
    pub fn response(&self) -> ListResponse<T> {
        ListResponse {
            data_source: self.data_source.clone(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            empty: self.empty,
            no_more: self.no_more,
            loading: self.is_loading(),
            initial: self.initial,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Polling,
    Finished,
    Paused,
    Abandoned,
    Disposed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobPhase::Idle | JobPhase::Polling)
    }

    pub(crate) fn from_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => JobPhase::Polling,
            JobStatus::Paused => JobPhase::Paused,
            JobStatus::Finished => JobPhase::Finished,
        }
    }
}

/// Client-side view of one remote job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub(crate) id: String,
    pub(crate) phase: JobPhase,
    pub(crate) last: Option<JobSnapshot>,
    pub(crate) consecutive_failures: u32,
    pub(crate) policy: PollPolicy,
}

impl JobState {
    pub fn new(id: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            id: id.into(),
            phase: JobPhase::Idle,
            last: None,
            consecutive_failures: 0,
            policy,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&JobSnapshot> {
        self.last.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new(String::new(), PollPolicy::default())
    }
}

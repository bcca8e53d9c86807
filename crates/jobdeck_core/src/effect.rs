use std::time::Duration;

use crate::{FetchMode, FinishReason, JobSnapshot, ListParams, Tip};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEffect {
    Fetch { mode: FetchMode, params: ListParams },
    LoadingChanged(bool),
    StateChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEffect {
    /// Wait, then request the status again.
    SchedulePoll(Duration),
    EmitUpdate(JobSnapshot),
    EmitFinish(FinishReason),
    EmitTip(Tip),
    StopPolling,
}

use crate::{
    ApiError, FetchMode, FinishReason, JobEffect, JobMsg, JobPhase, JobSnapshot, JobState,
    ListEffect, ListMsg, ListPhase, ListState, PaginatedResult, Tip,
};

/// Pure list update: applies a message and returns the effects to run.
///
/// At most one fetch is in flight; `Init`, `LoadMore`, `Refresh` and `Search`
/// arriving while one is pending are dropped without touching the state.
pub fn update_list<T>(mut state: ListState<T>, msg: ListMsg<T>) -> (ListState<T>, Vec<ListEffect>) {
    let effects = match msg {
        ListMsg::Init | ListMsg::Refresh => {
            if state.is_loading() {
                return (state, Vec::new());
            }
            start_fetch(&mut state, FetchMode::Replace, 1)
        }
        ListMsg::Search(params) => {
            if state.is_loading() {
                return (state, Vec::new());
            }
            state.params.extend(params);
            state.next_marker = None;
            start_fetch(&mut state, FetchMode::Replace, 1)
        }
        ListMsg::LoadMore => {
            if state.is_loading() || state.no_more {
                return (state, Vec::new());
            }
            if state.initial {
                start_fetch(&mut state, FetchMode::Replace, 1)
            } else {
                let next_page = state.page.saturating_add(1);
                start_fetch(&mut state, FetchMode::Append, next_page)
            }
        }
        ListMsg::Loaded(result) => match result.error.clone() {
            Some(error) => apply_failure(&mut state, error),
            None => apply_page(&mut state, result),
        },
        ListMsg::Failed(error) => apply_failure(&mut state, error),
        ListMsg::Cancelled => apply_cancel(&mut state),
    };

    (state, effects)
}

fn start_fetch<T>(state: &mut ListState<T>, mode: FetchMode, page: u32) -> Vec<ListEffect> {
    let params = state.request_params(mode, page);
    state.phase = ListPhase::Loading;
    state.pending = Some((mode, page));
    vec![
        ListEffect::LoadingChanged(true),
        ListEffect::Fetch { mode, params },
    ]
}

fn apply_page<T>(state: &mut ListState<T>, result: PaginatedResult<T>) -> Vec<ListEffect> {
    let Some((mode, page)) = state.pending.take() else {
        return Vec::new();
    };
    match mode {
        FetchMode::Replace => {
            state.data_source = result.data_source;
            state.empty = result.empty;
        }
        FetchMode::Append => {
            state.data_source.extend(result.data_source);
            state.empty = state.data_source.is_empty() && page == 1;
        }
    }
    state.page = page;
    state.page_size = result.page_size.max(1);
    state.total = result.total;
    state.no_more = result.no_more;
    state.next_marker = result.next_marker;
    state.initial = false;
    state.error = None;
    state.phase = ListPhase::Loaded;
    vec![
        ListEffect::LoadingChanged(false),
        ListEffect::StateChanged,
    ]
}

fn apply_failure<T>(state: &mut ListState<T>, error: ApiError) -> Vec<ListEffect> {
    if state.pending.take().is_none() {
        return Vec::new();
    }
    // Keep whatever was loaded before; only the error changes.
    state.error = Some(error);
    state.phase = ListPhase::Failed;
    vec![ListEffect::LoadingChanged(false)]
}

fn apply_cancel<T>(state: &mut ListState<T>) -> Vec<ListEffect> {
    if state.pending.take().is_none() {
        return Vec::new();
    }
    state.phase = if state.error.is_some() {
        ListPhase::Failed
    } else if state.initial {
        ListPhase::Idle
    } else {
        ListPhase::Loaded
    };
    vec![ListEffect::LoadingChanged(false)]
}

/// Pure job update: applies a message and returns the effects to run.
pub fn update_job(mut state: JobState, msg: JobMsg) -> (JobState, Vec<JobEffect>) {
    let effects = match msg {
        JobMsg::StartPolling => {
            if state.phase != JobPhase::Idle {
                return (state, Vec::new());
            }
            let cached_terminal = state.last.as_ref().and_then(|snapshot| {
                FinishReason::from_status(snapshot.status).map(|reason| (snapshot.status, reason))
            });
            match cached_terminal {
                // Already known to be over; never poll it.
                Some((status, reason)) => {
                    state.phase = JobPhase::from_status(status);
                    vec![JobEffect::EmitFinish(reason), JobEffect::StopPolling]
                }
                None => {
                    state.phase = JobPhase::Polling;
                    vec![JobEffect::SchedulePoll(state.policy.interval)]
                }
            }
        }
        JobMsg::SnapshotCached(snapshot) => {
            if state.phase == JobPhase::Disposed {
                return (state, Vec::new());
            }
            let snapshot = snapshot.normalized(&state.id, state.last.as_ref());
            state.last = Some(snapshot);
            Vec::new()
        }
        JobMsg::StatusFetched(snapshot) => {
            if state.phase != JobPhase::Polling {
                return (state, Vec::new());
            }
            apply_status(&mut state, snapshot)
        }
        JobMsg::StatusFailed(error) => {
            if state.phase != JobPhase::Polling {
                return (state, Vec::new());
            }
            apply_poll_failure(&mut state, error)
        }
        JobMsg::Dispose => {
            if state.phase == JobPhase::Disposed {
                return (state, Vec::new());
            }
            state.phase = JobPhase::Disposed;
            vec![JobEffect::StopPolling]
        }
    };

    (state, effects)
}

fn apply_status(state: &mut JobState, snapshot: JobSnapshot) -> Vec<JobEffect> {
    state.consecutive_failures = 0;
    let snapshot = snapshot.normalized(&state.id, state.last.as_ref());
    let changed = state.last.as_ref().is_some_and(|previous| {
        previous.status != snapshot.status || previous.percent != snapshot.percent
    });
    state.last = Some(snapshot.clone());

    let mut effects = Vec::new();
    if changed {
        effects.push(JobEffect::EmitUpdate(snapshot.clone()));
    }
    match FinishReason::from_status(snapshot.status) {
        Some(reason) => {
            state.phase = JobPhase::from_status(snapshot.status);
            if let Some(error) = snapshot.error.as_deref().filter(|e| !e.is_empty()) {
                effects.push(JobEffect::EmitTip(Tip::new([
                    format!("Job {} failed", state.id),
                    error.to_string(),
                ])));
            }
            effects.push(JobEffect::EmitFinish(reason));
            effects.push(JobEffect::StopPolling);
        }
        None => effects.push(JobEffect::SchedulePoll(state.policy.interval)),
    }
    effects
}

fn apply_poll_failure(state: &mut JobState, error: ApiError) -> Vec<JobEffect> {
    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    let failures = state.consecutive_failures;
    match state.policy.max_consecutive_failures {
        Some(limit) if failures >= limit => {
            state.phase = JobPhase::Abandoned;
            vec![
                JobEffect::EmitTip(Tip::new([
                    format!("Stopped watching job {} after {failures} failed checks", state.id),
                    error.to_string(),
                ])),
                JobEffect::EmitFinish(FinishReason::Abandoned),
                JobEffect::StopPolling,
            ]
        }
        _ => vec![JobEffect::SchedulePoll(
            state.policy.delay_after_failures(failures),
        )],
    }
}

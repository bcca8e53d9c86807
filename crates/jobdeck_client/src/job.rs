use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobdeck_core::{
    update_job, ApiError, Emitter, FinishReason, JobEffect, JobMsg, JobPhase, JobSnapshot,
    JobState, JobStatus, PollPolicy, Subscription, Tip,
};
use jobdeck_logging::{jobdeck_debug, jobdeck_error, jobdeck_info, jobdeck_warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{fetch_job_status, lock, Transport};

/// Client-side entity for one remote job.
///
/// Cloning is cheap and every clone refers to the same entity; identity is
/// checked with [`JobHandle::ptr_eq`].
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

struct JobInner {
    id: String,
    transport: Arc<dyn Transport>,
    state: Mutex<JobState>,
    update: Emitter<JobSnapshot>,
    finish: Emitter<FinishReason>,
    tip: Emitter<Tip>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>, policy: PollPolicy) -> Self {
        let id = id.into();
        Self {
            inner: Arc::new(JobInner {
                state: Mutex::new(JobState::new(id.clone(), policy)),
                id,
                transport,
                update: Emitter::new(),
                finish: Emitter::new(),
                tip: Emitter::new(),
                cancel: CancellationToken::new(),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn ptr_eq(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Latest status seen, by a one-shot check or a polling tick.
    pub fn snapshot(&self) -> Option<JobSnapshot> {
        lock(&self.inner.state).snapshot().cloned()
    }

    pub fn status(&self) -> Option<JobStatus> {
        lock(&self.inner.state).snapshot().map(|s| s.status)
    }

    pub fn percent(&self) -> f64 {
        lock(&self.inner.state).snapshot().map_or(0.0, |s| s.percent)
    }

    pub fn updated(&self) -> Option<String> {
        lock(&self.inner.state)
            .snapshot()
            .and_then(|s| s.updated.clone())
    }

    pub fn phase(&self) -> JobPhase {
        lock(&self.inner.state).phase()
    }

    /// Requests the status once and caches it as the baseline for polling.
    /// Emits nothing.
    pub async fn fetch_status(&self) -> Result<JobSnapshot, ApiError> {
        let fetched = fetch_job_status(self.inner.transport.as_ref(), &self.inner.id).await?;
        self.inner.apply(JobMsg::SnapshotCached(fetched.clone()));
        if self.phase() == JobPhase::Disposed {
            return Ok(fetched.normalized(&self.inner.id, None));
        }
        Ok(self.snapshot().unwrap_or(fetched))
    }

    /// Starts polling until the job reaches a terminal status. Calling it
    /// again, or on a job already known to be over, starts nothing new.
    ///
    /// Must be called from within a tokio runtime.
    pub fn wait_finish(&self) {
        let Ok(runtime) = Handle::try_current() else {
            jobdeck_error!("wait_finish for job {} called outside a tokio runtime", self.inner.id);
            return;
        };
        let Some(delay) = self.inner.run_effects(self.inner.apply(JobMsg::StartPolling)) else {
            return;
        };
        jobdeck_debug!("Polling job {} every {:?}", self.inner.id, delay);
        let task = runtime.spawn(poll_loop(Arc::clone(&self.inner), delay));
        *lock(&self.inner.poller) = Some(task);
    }

    /// Feeds a status learned outside the polling loop. A terminal status
    /// finishes the entity the same way a polling tick would.
    pub(crate) fn settle(&self, snapshot: JobSnapshot) {
        let effects = match self.phase() {
            JobPhase::Polling => self.inner.apply(JobMsg::StatusFetched(snapshot)),
            JobPhase::Idle => {
                self.inner.apply(JobMsg::SnapshotCached(snapshot));
                self.inner.apply(JobMsg::StartPolling)
            }
            _ => return,
        };
        if self.inner.run_effects(effects).is_none() {
            self.inner.cancel.cancel();
        }
    }

    /// Stops polling and detaches every handler.
    pub fn dispose(&self) {
        self.inner.apply(JobMsg::Dispose);
        self.inner.cancel.cancel();
        lock(&self.inner.poller).take();
        self.inner.update.clear();
        self.inner.finish.clear();
        self.inner.tip.clear();
    }

    pub fn on_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&JobSnapshot) + Send + Sync + 'static,
    {
        self.inner.update.subscribe(handler)
    }

    pub fn on_finish<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&FinishReason) + Send + Sync + 'static,
    {
        self.inner.finish.subscribe(handler)
    }

    pub fn on_tip<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Tip) + Send + Sync + 'static,
    {
        self.inner.tip.subscribe(handler)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("phase", &self.phase())
            .field("percent", &self.percent())
            .finish()
    }
}

impl JobInner {
    fn apply(&self, msg: JobMsg) -> Vec<JobEffect> {
        let mut guard = lock(&self.state);
        let state = std::mem::take(&mut *guard);
        let (state, effects) = update_job(state, msg);
        *guard = state;
        effects
    }

    /// Runs emit effects in order and returns the next poll delay, if any.
    fn run_effects(&self, effects: Vec<JobEffect>) -> Option<Duration> {
        let mut next_poll = None;
        for effect in effects {
            match effect {
                JobEffect::SchedulePoll(delay) => next_poll = Some(delay),
                JobEffect::EmitUpdate(snapshot) => {
                    jobdeck_debug!(
                        "Job {} is {} at {:.0}%",
                        self.id,
                        snapshot.status,
                        snapshot.percent * 100.0
                    );
                    self.update.emit(&snapshot);
                }
                JobEffect::EmitFinish(reason) => {
                    jobdeck_info!("Job {} done watching: {:?}", self.id, reason);
                    self.finish.emit(&reason);
                }
                JobEffect::EmitTip(tip) => self.tip.emit(&tip),
                JobEffect::StopPolling => next_poll = None,
            }
        }
        next_poll
    }
}

async fn poll_loop(inner: Arc<JobInner>, mut delay: Duration) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        let fetched = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            fetched = fetch_job_status(inner.transport.as_ref(), &inner.id) => fetched,
        };
        let msg = match fetched {
            Ok(snapshot) => JobMsg::StatusFetched(snapshot),
            Err(error) => {
                jobdeck_warn!("Status check for job {} failed: {}", inner.id, error);
                JobMsg::StatusFailed(error)
            }
        };
        match inner.run_effects(inner.apply(msg)) {
            Some(next) => delay = next,
            None => return,
        }
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use jobdeck_core::{Emitter, FinishReason, PollPolicy, Subscription, Tip};
use jobdeck_logging::{jobdeck_debug, jobdeck_error, jobdeck_info, jobdeck_warn};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::{lock, JobHandle, KeyValueCache, Transport};

/// Cache key of the tracked job id list.
pub const TRACKED_JOBS_KEY: &str = "jobs";

type TipCallback = Box<dyn Fn(&Tip) + Send + Sync>;
type FinishCallback = Box<dyn Fn(&FinishReason) + Send + Sync>;

/// Request for [`JobRegistry::create_job`].
pub struct CreateJob {
    pub job_id: String,
    pub on_tip: Option<TipCallback>,
    pub on_finish: Option<FinishCallback>,
}

impl CreateJob {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            on_tip: None,
            on_finish: None,
        }
    }

    pub fn on_tip<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Tip) + Send + Sync + 'static,
    {
        self.on_tip = Some(Box::new(handler));
        self
    }

    pub fn on_finish<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FinishReason) + Send + Sync + 'static,
    {
        self.on_finish = Some(Box::new(handler));
        self
    }
}

struct TrackedJob {
    job: JobHandle,
    listeners: [Subscription; 2],
}

impl TrackedJob {
    fn detach(self) -> JobHandle {
        for listener in &self.listeners {
            listener.unsubscribe();
        }
        self.job
    }
}

struct RegistryInner {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn KeyValueCache>,
    policy: PollPolicy,
    /// Tracked entities. Also guards every read-modify-write of the
    /// persisted id list.
    tracked: Mutex<Vec<TrackedJob>>,
    jobs_change: Emitter<Vec<JobHandle>>,
    percent_change: Emitter<BTreeMap<String, f64>>,
}

/// The set of jobs this client keeps watching, mirrored to a
/// [`KeyValueCache`] under [`TRACKED_JOBS_KEY`] so it survives restarts.
///
/// Holds at most one entity per job id. Cloning shares the same registry.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn KeyValueCache>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                cache,
                policy,
                tracked: Mutex::new(Vec::new()),
                jobs_change: Emitter::new(),
                percent_change: Emitter::new(),
            }),
        }
    }

    /// New, untracked entity using this registry's transport and policy.
    pub fn job(&self, id: &str) -> JobHandle {
        JobHandle::new(id, Arc::clone(&self.inner.transport), self.inner.policy)
    }

    pub fn jobs(&self) -> Vec<JobHandle> {
        lock(&self.inner.tracked)
            .iter()
            .map(|tracked| tracked.job.clone())
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<JobHandle> {
        lock(&self.inner.tracked)
            .iter()
            .find(|tracked| tracked.job.id() == id)
            .map(|tracked| tracked.job.clone())
    }

    /// Persisted ids, in insertion order.
    pub fn tracked_ids(&self) -> Vec<String> {
        read_ids(self.inner.cache.as_ref())
    }

    /// Rehydrates tracking from the persisted ids. Ids already over are
    /// dropped; the rest are polled. Emits one jobs-changed event at the end.
    pub async fn initialize_jobs(&self) {
        let ids = self.tracked_ids();
        jobdeck_info!("Rehydrating {} tracked job(s)", ids.len());
        for id in ids {
            if self.find(&id).is_some() {
                continue;
            }
            let job = self.job(&id);
            match job.fetch_status().await {
                Ok(snapshot) if snapshot.status.is_terminal() => {
                    jobdeck_info!("Job {} is already {}; no longer tracked", id, snapshot.status);
                    self.forget_id(&id);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    jobdeck_warn!("Initial status check for job {} failed, polling anyway: {}", id, error);
                }
            }
            let (job, _) = self.track(job);
            job.wait_finish();
        }
        self.emit_jobs_changed();
    }

    /// Re-checks every persisted id and drops the ones that are over. A
    /// tracked job found over emits its finish before it is dropped.
    /// Polling of the remaining jobs is left as is.
    pub async fn refresh_jobs(&self) {
        let ids = self.tracked_ids();
        for id in ids {
            // A throwaway entity keeps the tracked one's baseline intact.
            let check = self.job(&id);
            match check.fetch_status().await {
                Ok(snapshot) if snapshot.status.is_terminal() => {
                    jobdeck_info!("Job {} is {}; removing from tracked jobs", id, snapshot.status);
                    // A tracked entity finishes through its own finish event,
                    // which also untracks it.
                    if let Some(tracked) = self.find(&id) {
                        tracked.settle(snapshot);
                    }
                    self.forget_id(&id);
                    if let Some(stale) = self.untrack(&id) {
                        stale.dispose();
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    jobdeck_warn!("Status check for job {} failed during refresh: {}", id, error);
                }
            }
        }
        self.emit_jobs_changed();
    }

    /// Starts tracking `job` and returns the tracked entity: `job` itself, or
    /// the entity already tracked under the same id.
    pub fn append_job(&self, job: JobHandle) -> JobHandle {
        let (tracked, added) = self.track(job);
        if added {
            self.emit_jobs_changed();
        }
        tracked
    }

    /// Stops tracking `job`, forgets its id and disposes it. No-op when the
    /// job is not tracked.
    pub fn remove_job(&self, job: &JobHandle) {
        self.forget_id(job.id());
        let removed = {
            let mut tracked = lock(&self.inner.tracked);
            tracked
                .iter()
                .position(|t| t.job.ptr_eq(job) || t.job.id() == job.id())
                .map(|index| tracked.remove(index).detach())
        };
        if let Some(removed) = removed {
            removed.dispose();
            self.emit_jobs_changed();
        }
    }

    /// Tracks a job the service just started and polls it to completion.
    /// When it finishes, a [`JobRegistry::refresh_jobs`] pass reconciles the
    /// rest of the tracked set.
    pub fn create_job(&self, request: CreateJob) -> JobHandle {
        let CreateJob {
            job_id,
            on_tip,
            on_finish,
        } = request;
        let job = self.append_job(self.job(&job_id));

        if let Some(on_tip) = on_tip {
            job.on_tip(move |tip| on_tip(tip));
        }
        let registry = Arc::downgrade(&self.inner);
        job.on_finish(move |reason| {
            if let Some(inner) = registry.upgrade() {
                spawn_refresh(JobRegistry { inner });
            }
            if let Some(on_finish) = &on_finish {
                on_finish(reason);
            }
        });
        job.wait_finish();
        job
    }

    pub fn on_jobs_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Vec<JobHandle>) + Send + Sync + 'static,
    {
        self.inner.jobs_change.subscribe(handler)
    }

    /// Id to percent of every tracked job, emitted whenever one of them
    /// reports progress.
    pub fn on_jobs_percent_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BTreeMap<String, f64>) + Send + Sync + 'static,
    {
        self.inner.percent_change.subscribe(handler)
    }

    /// Stops every tracked job and drops all subscribers. The persisted ids
    /// stay, so a later [`JobRegistry::initialize_jobs`] picks them up again.
    pub fn dispose(&self) {
        let tracked = std::mem::take(&mut *lock(&self.inner.tracked));
        for entry in tracked {
            entry.detach().dispose();
        }
        self.inner.jobs_change.clear();
        self.inner.percent_change.clear();
    }

    fn track(&self, job: JobHandle) -> (JobHandle, bool) {
        let mut tracked = lock(&self.inner.tracked);
        if let Some(existing) = tracked
            .iter()
            .find(|t| t.job.ptr_eq(&job) || t.job.id() == job.id())
        {
            return (existing.job.clone(), false);
        }
        let listeners = self.listen(&job);
        add_id(self.inner.cache.as_ref(), job.id());
        tracked.push(TrackedJob {
            job: job.clone(),
            listeners,
        });
        jobdeck_debug!("Tracking job {}", job.id());
        (job, true)
    }

    fn listen(&self, job: &JobHandle) -> [Subscription; 2] {
        let registry = Arc::downgrade(&self.inner);
        let on_update = job.on_update(move |_| {
            if let Some(registry) = upgrade(&registry) {
                registry.emit_jobs_changed();
                registry.emit_percent_change();
            }
        });

        let registry = Arc::downgrade(&self.inner);
        let id = job.id().to_string();
        let on_finish = job.on_finish(move |reason| {
            let Some(registry) = upgrade(&registry) else {
                return;
            };
            // An abandoned job may still be running remotely; keep its id so
            // the next startup checks it again.
            if *reason != FinishReason::Abandoned {
                registry.forget_id(&id);
            }
            if let Some(job) = registry.untrack(&id) {
                job.dispose();
            }
            registry.emit_jobs_changed();
        });

        [on_update, on_finish]
    }

    fn untrack(&self, id: &str) -> Option<JobHandle> {
        let mut tracked = lock(&self.inner.tracked);
        let index = tracked.iter().position(|t| t.job.id() == id)?;
        Some(tracked.remove(index).detach())
    }

    fn forget_id(&self, id: &str) {
        let _tracked = lock(&self.inner.tracked);
        remove_id(self.inner.cache.as_ref(), id);
    }

    fn emit_jobs_changed(&self) {
        let jobs = self.jobs();
        self.inner.jobs_change.emit(&jobs);
    }

    fn emit_percent_change(&self) {
        let percents = self
            .jobs()
            .iter()
            .map(|job| (job.id().to_string(), job.percent()))
            .collect();
        self.inner.percent_change.emit(&percents);
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

fn upgrade(inner: &Weak<RegistryInner>) -> Option<JobRegistry> {
    inner.upgrade().map(|inner| JobRegistry { inner })
}

fn spawn_refresh(registry: JobRegistry) {
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move { registry.refresh_jobs().await });
        }
        Err(_) => {
            jobdeck_warn!("No runtime available for the post-finish job refresh");
        }
    }
}

fn read_ids(cache: &dyn KeyValueCache) -> Vec<String> {
    let items = match cache.get(TRACKED_JOBS_KEY) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            jobdeck_warn!("Ignoring malformed tracked job list: {}", other);
            return Vec::new();
        }
    };
    let mut ids: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if let Value::String(id) = item {
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

fn write_ids(cache: &dyn KeyValueCache, ids: &[String]) {
    if let Err(err) = cache.set(TRACKED_JOBS_KEY, Value::from(ids.to_vec())) {
        jobdeck_error!("Failed to persist tracked job ids: {}", err);
    }
}

fn add_id(cache: &dyn KeyValueCache, id: &str) {
    if id.is_empty() {
        return;
    }
    let mut ids = read_ids(cache);
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        write_ids(cache, &ids);
    }
}

fn remove_id(cache: &dyn KeyValueCache, id: &str) {
    let mut ids = read_ids(cache);
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() != before {
        write_ids(cache, &ids);
    }
}

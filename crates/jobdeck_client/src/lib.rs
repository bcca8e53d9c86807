//! Jobdeck client: HTTP transport, job tracking and list loading on top of
//! the pure state machines in `jobdeck_core`.
mod cache;
mod job;
mod list;
mod registry;
mod services;
mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cache::{ensure_cache_dir, FileCache, KeyValueCache, MemoryCache, PersistError};
pub use job::JobHandle;
pub use list::{EndpointFetcher, ListController, ListFetcher};
pub use registry::{CreateJob, JobRegistry, TRACKED_JOBS_KEY};
pub use services::{
    clear_expired_jobs, fetch_job_list, fetch_job_logs, fetch_job_profile, fetch_job_status,
    job_list_controller, pause_job, JobLogLine, JobProfile, JOB_LIST_ENDPOINT,
};
pub use transport::{decode_envelope, ReqwestTransport, Transport, TransportSettings};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

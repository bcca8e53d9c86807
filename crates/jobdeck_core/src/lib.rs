//! Jobdeck core: pure list/job state machines, response normalization and
//! event fan-out. Nothing in here performs IO.
mod effect;
mod emitter;
mod error;
mod job;
mod msg;
mod normalize;
mod state;
mod update;
mod view_model;

pub use effect::{JobEffect, ListEffect};
pub use emitter::{Emitter, Subscription};
pub use error::{ApiError, TransportFailure};
pub use job::{FinishReason, JobItem, JobSnapshot, JobStatus, PollPolicy, Tip};
pub use msg::{JobMsg, ListMsg};
pub use normalize::{normalize, PaginatedResult, DEFAULT_PAGE_SIZE};
pub use state::{FetchMode, JobPhase, JobState, ListParams, ListPhase, ListResponse, ListState};
pub use update::{update_job, update_list};
pub use view_model::JobRowView;

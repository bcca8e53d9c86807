use crate::{JobItem, JobStatus};

/// Display-ready row for the job list.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub id: String,
    pub kind: String,
    pub desc: String,
    pub status: JobStatus,
    pub status_label: &'static str,
    /// Only present while the job runs.
    pub percent_text: Option<String>,
    pub error: Option<String>,
    pub created: String,
    pub updated: String,
    pub can_pause: bool,
}

impl From<&JobItem> for JobRowView {
    fn from(item: &JobItem) -> Self {
        let running = item.status == JobStatus::Running;
        Self {
            id: item.id.clone(),
            kind: item.kind.clone(),
            desc: item.desc.clone(),
            status: item.status,
            status_label: item.status.label(),
            percent_text: running.then(|| format_percent(item.percent)),
            error: item.error.clone(),
            created: item.created.clone(),
            updated: item.updated.clone(),
            can_pause: running,
        }
    }
}

pub(crate) fn format_percent(fraction: f64) -> String {
    let clamped = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{:.0}%", clamped * 100.0)
}

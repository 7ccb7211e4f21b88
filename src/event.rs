use serde::Serialize;

use crate::id::JobId;

/// Lifecycle events published by `JobRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started { id: JobId, kind: String },
    Completed { id: JobId },
    Failed { id: JobId, error: String },
    Cancelled { id: JobId },
    NotFoundOnCancel { id: JobId },
}

impl JobEvent {
    pub fn id(&self) -> JobId {
        match self {
            JobEvent::Started { id, .. }
            | JobEvent::Completed { id }
            | JobEvent::Failed { id, .. }
            | JobEvent::Cancelled { id }
            | JobEvent::NotFoundOnCancel { id } => *id,
        }
    }

    pub(crate) fn log(&self) {
        match self {
            JobEvent::Started { id, kind } => {
                tracing::info!(job_id = %id, kind = %kind, "Job started and tracked")
            }
            JobEvent::Completed { id } => {
                tracing::info!(job_id = %id, "Job completed, removed from tracking")
            }
            JobEvent::Failed { id, error } => {
                tracing::error!(job_id = %id, error = %error, "Job failed")
            }
            JobEvent::Cancelled { id } => tracing::info!(job_id = %id, "Job cancelled"),
            JobEvent::NotFoundOnCancel { id } => {
                tracing::warn!(job_id = %id, "Job not found or already completed")
            }
        }
    }
}

// src/models.rs
use actix::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message pushed to every client listening to a job.
#[derive(Message, Clone, Debug, Serialize, PartialEq)]
#[rtype(result = "()")]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued { job_id: String },
    Started { job_id: String, file_name: String },
    Output { job_id: String, data: String },
    Completed { job_id: String, exit_code: Option<i32> },
    Failed { job_id: String, reason: String },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// Public view of a job, returned by the jobs API.
#[derive(Serialize, Clone, Debug)]
pub struct JobSnapshot {
    pub id: String,
    pub file_name: String,
    pub original_name: String,
    pub status: JobStatus,
    pub runs: u64,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

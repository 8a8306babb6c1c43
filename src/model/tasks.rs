use crate::schema::task_submissions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Submission lifecycle: a row exists once a photo is stored (`uploaded`),
/// then moves to `verified` (awards task points) or `rejected` (terminal,
/// set by the external moderation workflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Uploaded,
    Verified,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Uploaded => "uploaded",
            SubmissionStatus::Verified => "verified",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_submissions)]
pub struct NewTaskSubmission {
    pub user_id: i64,
    pub lesson_id: i64,
    pub photo_path: String,
    pub photo_url: String,
    pub status: String,
    // submitted_at has a DB default (CURRENT_TIMESTAMP), verified_at is NULL
}

#[derive(Deserialize, Serialize, Debug, Queryable)]
pub struct TaskSubmissionRecord {
    pub user_id: i64,
    pub lesson_id: i64,
    pub photo_path: String,
    pub photo_url: String,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

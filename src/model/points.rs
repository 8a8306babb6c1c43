use crate::progression::{Badge, BadgeProgress, Rank};
use crate::schema::eco_point_events;
use crate::schema::quiz_attempts;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger event kinds. `video`, `quiz` and `task` awards are deduplicated
/// per (user, kind, subject) by a partial unique index on the event table;
/// `quiz_retake` and `redemption` rows are unbounded in count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Video,
    Quiz,
    QuizRetake,
    Task,
    Redemption,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Video => "video",
            EventKind::Quiz => "quiz",
            EventKind::QuizRetake => "quiz_retake",
            EventKind::Task => "task",
            EventKind::Redemption => "redemption",
        }
    }

    /// Whether the ledger enforces at-most-one event per (user, kind, subject).
    pub fn deduplicated(self) -> bool {
        matches!(self, EventKind::Video | EventKind::Quiz | EventKind::Task)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = eco_point_events)]
pub struct NewEcoPointEvent {
    pub user_id: i64,
    pub event_kind: String,
    pub subject_id: i64,
    pub points: i32,
    // created_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quiz_attempts)]
pub struct NewQuizAttempt {
    pub user_id: i64,
    pub lesson_id: i64,
    pub correct_count: i32,
    pub total_count: i32,
    pub retake: bool,
    pub points_awarded: i32,
    // submitted_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Deserialize, Serialize, Debug, Queryable)]
pub struct EcoPointEventRecord {
    pub id: i64,
    pub event_kind: String,
    pub subject_id: i64,
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

/// Result of one ledger-mutating action. The totals come from the write's
/// own transaction, so a caller can render them without a follow-up read.
/// `awarded == false` with a 200 status is the benign duplicate/no-op case.
#[derive(Deserialize, Serialize, Debug)]
pub struct AwardOutcome {
    pub awarded: bool,
    pub points_delta: i32,
    pub lifetime_points: i32,
    pub spendable_points: i32,
    pub rank: Rank,
    pub new_badges: Vec<Badge>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PointsSummary {
    pub lifetime_points: i32,
    pub spendable_points: i32,
    pub rank: Rank,
    pub badges: Vec<Badge>,
    pub next_badge: Option<BadgeProgress>,
}

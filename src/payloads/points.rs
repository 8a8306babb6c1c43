use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct AwardVideoPayload {
    pub user_id: i64,
    pub lesson_id: i64,
    pub position_secs: f64,
    pub duration_secs: f64,
}

#[derive(Deserialize, Debug)]
pub struct AwardQuizPayload {
    pub user_id: i64,
    pub lesson_id: i64,
    pub correct_count: i32,
    pub total_count: i32,
    /// Retakes bypass first-attempt deduplication and stack additively.
    #[serde(default)]
    pub retake: bool,
}

#[derive(Deserialize, Debug)]
pub struct GetPointsParams {
    pub user_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetPointHistoryParams {
    pub user_id: i64,
}

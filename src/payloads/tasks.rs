use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct VerifyTaskPayload {
    pub user_id: i64,
    pub lesson_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetTaskSubmissionParams {
    pub user_id: i64,
    pub lesson_id: i64,
}

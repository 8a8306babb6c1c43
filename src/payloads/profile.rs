use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct CreateProfilePayload {
    pub user_id: i64,
    pub email: String,
    pub display_name: String,
    pub grade_band: String,
    pub region: String,
}

#[derive(Deserialize, Debug)]
pub struct GetProfileParams {
    pub user_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetLeaderboardParams {
    pub limit: Option<i64>,
}

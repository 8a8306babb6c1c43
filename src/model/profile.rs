use crate::progression::{Badge, BadgeProgress, Rank};
use crate::schema::profiles;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const GRADE_BANDS: &[&str] = &["elementary", "middle", "high", "college"];
pub const REGIONS: &[&str] = &["north", "south", "east", "west", "central"];

#[derive(Insertable, Debug)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub grade_band: String,
    pub region: String,
    // lifetime_points / spendable_points default to 0,
    // created_at and last_active have DB defaults (CURRENT_TIMESTAMP)
}

#[derive(Deserialize, Serialize, Debug, Queryable)]
pub struct ProfileRecord {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub grade_band: String,
    pub region: String,
    pub lifetime_points: i32,
    pub spendable_points: i32,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub grade_band: String,
    pub region: String,
    pub lifetime_points: i32,
    pub spendable_points: i32,
    pub rank: Rank,
    pub badges: Vec<Badge>,
    pub next_badge: Option<BadgeProgress>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LeaderboardEntry {
    pub position: i64,
    pub user_id: i64,
    pub display_name: String,
    pub region: String,
    pub lifetime_points: i32,
    pub rank_name: String,
}

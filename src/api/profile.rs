use super::helper;
use crate::AppState;
use crate::errors::AppError;
use crate::model::profile::{
    GRADE_BANDS, LeaderboardEntry, NewProfile, ProfileRecord, ProfileResponse, REGIONS,
};
use crate::payloads::profile::{CreateProfilePayload, GetLeaderboardParams, GetProfileParams};
use crate::progression;
use crate::response::ApiResponse;
use crate::schema;
use crate::schema::profiles::dsl as profiles_dsl;
use axum::extract::{Query, State};
use axum::response::Json;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::log::warn;
use tracing::{debug, info, instrument};

/// Creates the profile companion record at sign-up. Grade band and region
/// select content variants and are immutable afterwards.
///
/// Request Body: `CreateProfilePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new profile ID (200 OK).
/// * `409 Conflict`: If a profile with that ID already exists.
/// * `422 Unprocessable Entity`: If grade band or region is not a known value.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, payload))]
pub async fn create_profile(
    State(state): State<AppState>,
    Json(payload): Json<CreateProfilePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Attempting to create profile for user {}", payload.user_id);
    debug!("Create profile payload: {:?}", payload);

    if !GRADE_BANDS.contains(&payload.grade_band.as_str()) {
        return Err(AppError::UnprocessableEntity(format!(
            "Grade band '{}' is not one of {:?}.",
            payload.grade_band, GRADE_BANDS
        )));
    }
    if !REGIONS.contains(&payload.region.as_str()) {
        return Err(AppError::UnprocessableEntity(format!(
            "Region '{}' is not one of {:?}.",
            payload.region, REGIONS
        )));
    }

    let user_id = payload.user_id;
    let new_profile = NewProfile {
        id: user_id,
        email: payload.email,
        display_name: payload.display_name,
        grade_band: payload.grade_band,
        region: payload.region,
    };

    let insert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(profiles_dsl::profiles)
            .values(&new_profile)
            .returning(profiles_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match insert_result {
        Ok(new_id) => {
            info!("Successfully created profile {}", new_id);
            Ok(ApiResponse::ok(new_id))
        }
        Err(AppError::InternalServerError(ref err)) => {
            if let Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) =
                err.downcast_ref::<DieselError>()
            {
                warn!(
                    "Profile creation conflict for user {}. Details: {}",
                    user_id,
                    info.message()
                );
                return Err(AppError::Conflict(format!(
                    "Profile with ID {} already exists.",
                    user_id
                )));
            }
            Err(insert_result.unwrap_err())
        }
        Err(e) => Err(e),
    }
}

/// Retrieves a profile with its derived rank, badge and progress state.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `ProfileResponse` (200 OK).
/// * `404 Not Found`: If the profile does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, params))]
pub async fn get_profile(
    State(state): State<AppState>,
    Query(params): Query<GetProfileParams>,
) -> Result<ApiResponse<ProfileResponse>, AppError> {
    let user_id = params.user_id;
    info!("Fetching profile for user {}", user_id);

    let record = helper::run_query(&state.pool, move |conn| {
        profiles_dsl::profiles
            .find(user_id)
            .select(schema::profiles::all_columns)
            .first::<ProfileRecord>(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Profile with ID {} not found.", user_id)))?;

    let response = ProfileResponse {
        id: record.id,
        email: record.email,
        display_name: record.display_name,
        grade_band: record.grade_band,
        region: record.region,
        lifetime_points: record.lifetime_points,
        spendable_points: record.spendable_points,
        rank: progression::rank_of(record.lifetime_points),
        badges: progression::badges_unlocked(record.lifetime_points),
        next_badge: progression::progress_to_next(record.lifetime_points),
    };

    Ok(ApiResponse::ok(response))
}

/// Retrieves the top profiles by lifetime points with their rank names.
///
/// Query Parameters:
/// * `limit`: Optional entry count, defaults to 10, capped at 100.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<LeaderboardEntry>` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, params))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<GetLeaderboardParams>,
) -> Result<ApiResponse<Vec<LeaderboardEntry>>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    info!("Fetching leaderboard (top {})", limit);

    let rows = helper::run_query(&state.pool, move |conn| {
        profiles_dsl::profiles
            .order((profiles_dsl::lifetime_points.desc(), profiles_dsl::id.asc()))
            .limit(limit)
            .select((
                profiles_dsl::id,
                profiles_dsl::display_name,
                profiles_dsl::region,
                profiles_dsl::lifetime_points,
            ))
            .load::<(i64, String, String, i32)>(conn)
    })
    .await?;

    let entries = rows
        .into_iter()
        .enumerate()
        .map(
            |(index, (user_id, display_name, region, lifetime_points))| LeaderboardEntry {
                position: index as i64 + 1,
                user_id,
                display_name,
                region,
                lifetime_points,
                rank_name: progression::rank_of(lifetime_points).name,
            },
        )
        .collect::<Vec<_>>();

    info!("Successfully fetched {} leaderboard entries", entries.len());
    Ok(ApiResponse::ok(entries))
}

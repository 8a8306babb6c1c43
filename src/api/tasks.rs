use super::helper;
use super::points::{append_award, award_outcome, publish_if_awarded};
use crate::AppState;
use crate::errors::AppError;
use crate::model::points::{AwardOutcome, EventKind};
use crate::model::tasks::{NewTaskSubmission, SubmissionStatus, TaskSubmissionRecord};
use crate::payloads::tasks::{GetTaskSubmissionParams, VerifyTaskPayload};
use crate::progression;
use crate::response::ApiResponse;
use crate::schema;
use crate::schema::task_submissions::dsl as ts_dsl;
use crate::storage;
use axum::extract::multipart::{Field, Multipart};
use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use diesel::dsl::now;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use tracing::log::warn;
use tracing::{debug, info, instrument};

/// Records a photo-backed task submission: the photo goes to the object
/// store, then the submission row is upserted keyed on (user, lesson) so a
/// re-submission replaces the prior photo instead of duplicating the claim.
///
/// Request Body: multipart form with fields `user_id`, `lesson_id`, `photo`.
///
/// Returns (wrapped in `ApiResponse`)
/// * `TaskSubmissionRecord`: The stored submission, status `uploaded` (200 OK).
/// * `400 Bad Request`: If a multipart field is missing or malformed.
/// * `404 Not Found`: If the profile or lesson does not exist.
/// * `503 Service Unavailable`: If the object store rejects the photo.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, multipart))]
pub async fn upload_task_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<TaskSubmissionRecord>, AppError> {
    let mut user_id: Option<i64> = None;
    let mut lesson_id: Option<i64> = None;
    let mut photo: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError::BadRequest(format!("Malformed multipart request: {}", err))
    })? {
        match field.name().unwrap_or_default() {
            "user_id" => user_id = Some(parse_id_field(field, "user_id").await?),
            "lesson_id" => lesson_id = Some(parse_id_field(field, "lesson_id").await?),
            "photo" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::BadRequest(format!("Failed to read photo field: {}", err))
                })?;
                photo = Some((bytes.to_vec(), content_type));
            }
            other => debug!("Ignoring unexpected multipart field '{}'", other),
        }
    }

    let user_id = user_id
        .ok_or_else(|| AppError::BadRequest("Missing multipart field: user_id".to_string()))?;
    let lesson_id = lesson_id
        .ok_or_else(|| AppError::BadRequest("Missing multipart field: lesson_id".to_string()))?;
    let (bytes, content_type) = photo
        .ok_or_else(|| AppError::BadRequest("Missing multipart field: photo".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Photo field is empty".to_string()));
    }

    info!(
        "Uploading task photo for lesson {} by user {} ({} bytes, {})",
        lesson_id,
        user_id,
        bytes.len(),
        content_type
    );

    let object_name = storage::task_photo_object_name(
        user_id,
        lesson_id,
        storage::photo_extension(&content_type),
    );
    let stored = state
        .storage
        .upload_task_photo(&object_name, bytes, &content_type)
        .await?;

    let new_submission = NewTaskSubmission {
        user_id,
        lesson_id,
        photo_path: stored.path,
        photo_url: stored.public_url,
        status: SubmissionStatus::Uploaded.as_str().to_string(),
    };

    let upsert_result = helper::run_query(&state.pool, move |conn| {
        diesel::insert_into(ts_dsl::task_submissions)
            .values(&new_submission)
            .on_conflict((ts_dsl::user_id, ts_dsl::lesson_id))
            .do_update()
            .set((
                ts_dsl::photo_path.eq(excluded(ts_dsl::photo_path)),
                ts_dsl::photo_url.eq(excluded(ts_dsl::photo_url)),
                ts_dsl::status.eq(SubmissionStatus::Uploaded.as_str()),
                ts_dsl::submitted_at.eq(now),
                ts_dsl::verified_at.eq(None::<DateTime<Utc>>),
            ))
            .returning(schema::task_submissions::all_columns)
            .get_result::<TaskSubmissionRecord>(conn)
    })
    .await;

    match upsert_result {
        Ok(record) => {
            info!(
                "Task submission stored for lesson {} by user {} at '{}'",
                lesson_id, user_id, record.photo_path
            );
            Ok(ApiResponse::ok(record))
        }
        Err(AppError::InternalServerError(ref err)) => {
            if let Some(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info)) =
                err.downcast_ref::<DieselError>()
            {
                warn!(
                    "Task submission upsert hit a foreign key violation for user {} lesson {}. Details: {}",
                    user_id,
                    lesson_id,
                    info.message()
                );
                return Err(AppError::NotFound(format!(
                    "Profile with ID {} or Lesson with ID {} not found.",
                    user_id, lesson_id
                )));
            }
            Err(upsert_result.unwrap_err())
        }
        Err(e) => Err(e),
    }
}

async fn parse_id_field(field: Field<'_>, name: &str) -> Result<i64, AppError> {
    let text = field.text().await.map_err(|err| {
        AppError::BadRequest(format!("Failed to read field {}: {}", name, err))
    })?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Field {} must be an integer id", name)))
}

/// Transitions an uploaded submission to `verified` and awards the fixed
/// task points. Re-verifying an already verified submission is a benign
/// no-op (the deduplicated ledger write reports `awarded: false`).
///
/// Request Body: `VerifyTaskPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AwardOutcome` (200 OK).
/// * `404 Not Found`: If no submission exists for (user, lesson), or the
///   profile does not exist.
/// * `422 Unprocessable Entity`: If the submission was rejected.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, payload))]
pub async fn verify_task(
    State(state): State<AppState>,
    Json(payload): Json<VerifyTaskPayload>,
) -> Result<ApiResponse<AwardOutcome>, AppError> {
    let user_id = payload.user_id;
    let lesson_id = payload.lesson_id;

    info!(
        "Attempting task verification for lesson {} by user {}",
        lesson_id, user_id
    );

    let write = helper::run_ledger_transaction(&state.pool, move |conn| {
        let updated = diesel::update(
            ts_dsl::task_submissions
                .filter(ts_dsl::user_id.eq(user_id))
                .filter(ts_dsl::lesson_id.eq(lesson_id))
                .filter(ts_dsl::status.eq(SubmissionStatus::Uploaded.as_str())),
        )
        .set((
            ts_dsl::status.eq(SubmissionStatus::Verified.as_str()),
            ts_dsl::verified_at.eq(now),
        ))
        .execute(conn)?;

        if updated == 0 {
            let existing_status = ts_dsl::task_submissions
                .filter(ts_dsl::user_id.eq(user_id))
                .filter(ts_dsl::lesson_id.eq(lesson_id))
                .select(ts_dsl::status)
                .first::<String>(conn)
                .optional()?;

            match existing_status.as_deref() {
                None => {
                    warn!(
                        "Verification attempted with no submission for user {} lesson {}",
                        user_id, lesson_id
                    );
                    return Err(AppError::NotFound(format!(
                        "No task submission found for user {} and lesson {}.",
                        user_id, lesson_id
                    )));
                }
                // Already verified: fall through, the award dedup makes the
                // whole call a no-op.
                Some("verified") => {}
                Some(other) => {
                    return Err(AppError::UnprocessableEntity(format!(
                        "Task submission for user {} and lesson {} is '{}' and cannot be verified.",
                        user_id, lesson_id, other
                    )));
                }
            }
        }

        append_award(
            conn,
            user_id,
            EventKind::Task,
            lesson_id,
            progression::TASK_POINTS,
        )
    })
    .await?;

    info!(
        "Task verification for lesson {} by user {}: awarded={}, lifetime={}",
        lesson_id, user_id, write.awarded, write.lifetime_points
    );
    publish_if_awarded(&state.notifier, user_id, &write);
    Ok(ApiResponse::ok(award_outcome(&write, progression::TASK_POINTS)))
}

/// Retrieves the current submission for a (user, lesson) pair, if any.
///
/// Query Parameters:
/// * `user_id`, `lesson_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Option<TaskSubmissionRecord>`: `None` if nothing was submitted (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, params))]
pub async fn get_task_submission(
    State(state): State<AppState>,
    Query(params): Query<GetTaskSubmissionParams>,
) -> Result<ApiResponse<Option<TaskSubmissionRecord>>, AppError> {
    let user_id = params.user_id;
    let lesson_id = params.lesson_id;

    info!(
        "Fetching task submission for lesson {} by user {}",
        lesson_id, user_id
    );

    let submission = helper::run_query(&state.pool, move |conn| {
        ts_dsl::task_submissions
            .filter(ts_dsl::user_id.eq(user_id))
            .filter(ts_dsl::lesson_id.eq(lesson_id))
            .select(schema::task_submissions::all_columns)
            .first::<TaskSubmissionRecord>(conn)
            .optional()
    })
    .await?;

    Ok(ApiResponse::ok(submission))
}

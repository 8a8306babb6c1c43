use super::helper;
use crate::AppState;
use crate::errors::AppError;
use crate::model::points::{
    AwardOutcome, EcoPointEventRecord, EventKind, NewEcoPointEvent, NewQuizAttempt, PointsSummary,
};
use crate::notify::{PointsChanged, PointsNotifier};
use crate::payloads::points::{
    AwardQuizPayload, AwardVideoPayload, GetPointHistoryParams, GetPointsParams,
};
use crate::progression;
use crate::response::ApiResponse;
use crate::schema::{
    eco_point_events::dsl as epe_dsl, lessons::dsl as lessons_dsl, profiles::dsl as profiles_dsl,
    quiz_attempts::dsl as qa_dsl,
};
use axum::extract::{Query, State};
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use diesel::dsl::now;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::DecoratableTarget;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::log::warn;
use tracing::{debug, info, instrument};

/// Event kinds covered by the ledger's partial unique index; must stay in
/// sync with `EventKind::deduplicated`.
const DEDUPLICATED_KINDS: [&str; 3] = ["video", "quiz", "task"];

/// Result of one append to the ledger, carrying the totals the write itself
/// produced (read-your-own-write: no follow-up read needed).
pub(super) struct LedgerWrite {
    pub awarded: bool,
    pub lifetime_before: i32,
    pub lifetime_points: i32,
    pub spendable_points: i32,
}

/// Appends a point-awarding event and moves the materialized counters with
/// it. A duplicate of a deduplicated kind is absorbed by the ledger's
/// uniqueness constraint and reported as `awarded: false`, never an error.
/// Must run inside a transaction (see `helper::run_ledger_transaction`).
pub(super) fn append_award(
    conn: &mut PgConnection,
    user_id: i64,
    kind: EventKind,
    subject_id: i64,
    delta: i32,
) -> Result<LedgerWrite, AppError> {
    let event = NewEcoPointEvent {
        user_id,
        event_kind: kind.as_str().to_string(),
        subject_id,
        points: delta,
    };

    let insert_result = if kind.deduplicated() {
        diesel::insert_into(epe_dsl::eco_point_events)
            .values(&event)
            .on_conflict((epe_dsl::user_id, epe_dsl::event_kind, epe_dsl::subject_id))
            .filter_target(epe_dsl::event_kind.eq_any(DEDUPLICATED_KINDS))
            .do_nothing()
            .execute(conn)
    } else {
        diesel::insert_into(epe_dsl::eco_point_events)
            .values(&event)
            .execute(conn)
    };

    let inserted = match insert_result {
        Ok(rows) => rows == 1,
        Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info)) => {
            warn!(
                "Award insert hit a foreign key violation for user {}: {}",
                user_id,
                info.message()
            );
            return Err(AppError::NotFound(format!(
                "Profile with ID {} not found.",
                user_id
            )));
        }
        Err(e) => return Err(AppError::from(e)),
    };

    if inserted {
        let (lifetime_points, spendable_points) =
            diesel::update(profiles_dsl::profiles.find(user_id))
                .set((
                    profiles_dsl::lifetime_points.eq(profiles_dsl::lifetime_points + delta),
                    profiles_dsl::spendable_points.eq(profiles_dsl::spendable_points + delta),
                    profiles_dsl::last_active.eq(now),
                ))
                .returning((profiles_dsl::lifetime_points, profiles_dsl::spendable_points))
                .get_result::<(i32, i32)>(conn)?;

        Ok(LedgerWrite {
            awarded: true,
            lifetime_before: lifetime_points - delta,
            lifetime_points,
            spendable_points,
        })
    } else {
        info!(
            "Duplicate {} award for user {} subject {} absorbed by ledger constraint",
            kind.as_str(),
            user_id,
            subject_id
        );
        let (lifetime_points, spendable_points) = profiles_dsl::profiles
            .find(user_id)
            .select((profiles_dsl::lifetime_points, profiles_dsl::spendable_points))
            .first::<(i32, i32)>(conn)?;

        Ok(LedgerWrite {
            awarded: false,
            lifetime_before: lifetime_points,
            lifetime_points,
            spendable_points,
        })
    }
}

pub(super) fn award_outcome(write: &LedgerWrite, delta: i32) -> AwardOutcome {
    let new_badges = if write.awarded {
        progression::badges_crossed(write.lifetime_before, write.lifetime_points)
    } else {
        Vec::new()
    };

    AwardOutcome {
        awarded: write.awarded,
        points_delta: if write.awarded { delta } else { 0 },
        lifetime_points: write.lifetime_points,
        spendable_points: write.spendable_points,
        rank: progression::rank_of(write.lifetime_points),
        new_badges,
    }
}

pub(super) fn publish_if_awarded(notifier: &PointsNotifier, user_id: i64, write: &LedgerWrite) {
    if write.awarded {
        notifier.notify(PointsChanged {
            user_id,
            lifetime_points: write.lifetime_points,
            spendable_points: write.spendable_points,
        });
    }
}

async fn current_totals(
    pool: &deadpool_diesel::postgres::Pool,
    user_id: i64,
) -> Result<(i32, i32), AppError> {
    let totals = helper::run_query(pool, move |conn| {
        profiles_dsl::profiles
            .find(user_id)
            .select((profiles_dsl::lifetime_points, profiles_dsl::spendable_points))
            .first::<(i32, i32)>(conn)
            .optional()
    })
    .await?;

    totals.ok_or_else(|| AppError::NotFound(format!("Profile with ID {} not found.", user_id)))
}

/// Awards video-completion points once playback has crossed the completion
/// threshold.
///
/// Request Body: `AwardVideoPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AwardOutcome`: `awarded` is false both below the threshold and for a
///   repeat crossing of an already-awarded lesson (200 OK).
/// * `400 Bad Request`: If `duration_secs` is not positive.
/// * `404 Not Found`: If the profile or lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, payload))]
pub async fn award_video_points(
    State(state): State<AppState>,
    Json(payload): Json<AwardVideoPayload>,
) -> Result<ApiResponse<AwardOutcome>, AppError> {
    info!(
        "Attempting video award for lesson {} by user {}",
        payload.lesson_id, payload.user_id
    );
    debug!("Award video payload: {:?}", payload);

    if payload.duration_secs <= 0.0 {
        return Err(AppError::BadRequest(
            "duration_secs must be positive".to_string(),
        ));
    }

    if !progression::video_award_due(payload.position_secs, payload.duration_secs) {
        debug!(
            "Playback at {:.1}/{:.1}s is below the completion threshold, ledger untouched",
            payload.position_secs, payload.duration_secs
        );
        let (lifetime_points, spendable_points) =
            current_totals(&state.pool, payload.user_id).await?;
        let write = LedgerWrite {
            awarded: false,
            lifetime_before: lifetime_points,
            lifetime_points,
            spendable_points,
        };
        return Ok(ApiResponse::ok(award_outcome(&write, 0)));
    }

    let user_id = payload.user_id;
    let lesson_id = payload.lesson_id;
    let write = helper::run_ledger_transaction(&state.pool, move |conn| {
        // The ledger has no lesson FK (subject_id doubles as the coupon id
        // for redemptions), so the award itself must reject fabricated
        // lesson ids.
        lessons_dsl::lessons
            .find(lesson_id)
            .select(lessons_dsl::id)
            .first::<i64>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Lesson with ID {} not found.", lesson_id))
            })?;

        append_award(
            conn,
            user_id,
            EventKind::Video,
            lesson_id,
            progression::VIDEO_POINTS,
        )
    })
    .await?;

    info!(
        "Video award for lesson {} by user {}: awarded={}, lifetime={}",
        lesson_id, user_id, write.awarded, write.lifetime_points
    );
    publish_if_awarded(&state.notifier, user_id, &write);
    Ok(ApiResponse::ok(award_outcome(&write, progression::VIDEO_POINTS)))
}

/// Awards banded quiz points. First attempts are deduplicated per lesson;
/// retakes are recorded as a distinct event subtype and stack additively.
///
/// Request Body: `AwardQuizPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AwardOutcome`: `awarded` is false for a duplicate first attempt (200 OK).
/// * `400 Bad Request`: If the answer counts are not a valid score.
/// * `404 Not Found`: If the profile or lesson does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, payload))]
pub async fn award_quiz_points(
    State(state): State<AppState>,
    Json(payload): Json<AwardQuizPayload>,
) -> Result<ApiResponse<AwardOutcome>, AppError> {
    info!(
        "Attempting quiz award for lesson {} by user {} (retake: {})",
        payload.lesson_id, payload.user_id, payload.retake
    );
    debug!("Award quiz payload: {:?}", payload);

    if payload.total_count <= 0 {
        return Err(AppError::BadRequest(
            "total_count must be positive".to_string(),
        ));
    }
    if payload.correct_count < 0 || payload.correct_count > payload.total_count {
        return Err(AppError::BadRequest(
            "correct_count must be between 0 and total_count".to_string(),
        ));
    }

    let delta = progression::quiz_points(payload.correct_count, payload.total_count);
    let kind = if payload.retake {
        EventKind::QuizRetake
    } else {
        EventKind::Quiz
    };

    let user_id = payload.user_id;
    let lesson_id = payload.lesson_id;
    let correct_count = payload.correct_count;
    let total_count = payload.total_count;
    let retake = payload.retake;

    let write = helper::run_ledger_transaction(&state.pool, move |conn| {
        let write = append_award(conn, user_id, kind, lesson_id, delta)?;

        let attempt = NewQuizAttempt {
            user_id,
            lesson_id,
            correct_count,
            total_count,
            retake,
            points_awarded: if write.awarded { delta } else { 0 },
        };
        diesel::insert_into(qa_dsl::quiz_attempts)
            .values(&attempt)
            .execute(conn)
            .map_err(|e| {
                if let DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) = e {
                    warn!(
                        "Quiz attempt insert hit a foreign key violation for lesson {}",
                        lesson_id
                    );
                    AppError::NotFound(format!("Lesson with ID {} not found.", lesson_id))
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(write)
    })
    .await?;

    info!(
        "Quiz award for lesson {} by user {}: awarded={}, delta={}, lifetime={}",
        lesson_id, user_id, write.awarded, delta, write.lifetime_points
    );
    publish_if_awarded(&state.notifier, user_id, &write);
    Ok(ApiResponse::ok(award_outcome(&write, delta)))
}

/// Retrieves the current totals plus derived rank, badge and progress state.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `PointsSummary` (200 OK).
/// * `404 Not Found`: If the profile does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, params))]
pub async fn get_total_points(
    State(state): State<AppState>,
    Query(params): Query<GetPointsParams>,
) -> Result<ApiResponse<PointsSummary>, AppError> {
    info!("Fetching points summary for user {}", params.user_id);

    let (lifetime_points, spendable_points) = current_totals(&state.pool, params.user_id).await?;

    Ok(ApiResponse::ok(PointsSummary {
        lifetime_points,
        spendable_points,
        rank: progression::rank_of(lifetime_points),
        badges: progression::badges_unlocked(lifetime_points),
        next_badge: progression::progress_to_next(lifetime_points),
    }))
}

/// Retrieves the user's ledger events, newest first.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<EcoPointEventRecord>` (200 OK).
/// * `404 Not Found`: If the profile does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, params))]
pub async fn get_point_history(
    State(state): State<AppState>,
    Query(params): Query<GetPointHistoryParams>,
) -> Result<ApiResponse<Vec<EcoPointEventRecord>>, AppError> {
    let user_id = params.user_id;
    info!("Fetching point history for user {}", user_id);

    // Existence check first so an empty history is distinguishable from an
    // unknown user.
    current_totals(&state.pool, user_id).await?;

    let events = helper::run_query(&state.pool, move |conn| {
        epe_dsl::eco_point_events
            .filter(epe_dsl::user_id.eq(user_id))
            .order((epe_dsl::created_at.desc(), epe_dsl::id.desc()))
            .select((
                epe_dsl::id,
                epe_dsl::event_kind,
                epe_dsl::subject_id,
                epe_dsl::points,
                epe_dsl::created_at,
            ))
            .load::<EcoPointEventRecord>(conn)
    })
    .await?;

    info!(
        "Successfully fetched {} ledger events for user {}",
        events.len(),
        user_id
    );
    Ok(ApiResponse::ok(events))
}

/// Opens a server-sent-events stream of ledger change notifications for one
/// user. Each event carries a totals snapshot; the client refreshes from it
/// (or re-fetches) for cross-tab and cross-device consistency. Closing the
/// response tears the subscription down.
#[instrument(skip(state, params))]
pub async fn subscribe_point_events(
    State(state): State<AppState>,
    Query(params): Query<GetPointsParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = params.user_id;
    info!("Opening point event stream for user {}", user_id);

    let stream = BroadcastStream::new(state.notifier.subscribe()).filter_map(move |next| {
        // Lagged receivers drop straight to the newest snapshot.
        let change = next.ok()?;
        if change.user_id != user_id {
            return None;
        }
        let event = Event::default()
            .event("points-changed")
            .json_data(&change)
            .ok()?;
        Some(Ok::<Event, Infallible>(event))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

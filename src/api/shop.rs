use super::helper;
use crate::AppState;
use crate::errors::AppError;
use crate::model::points::{EventKind, NewEcoPointEvent};
use crate::model::shop::{CouponRecord, RedeemOutcome};
use crate::notify::PointsChanged;
use crate::payloads::shop::RedeemCouponPayload;
use crate::progression;
use crate::response::ApiResponse;
use crate::schema::{
    coupons::dsl as coupons_dsl, eco_point_events::dsl as epe_dsl, profiles::dsl as profiles_dsl,
};
use axum::extract::State;
use axum::response::Json;
use diesel::dsl::now;
use diesel::prelude::*;
use tracing::log::warn;
use tracing::{info, instrument};

/// Queries the active coupon catalog, cheapest first.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CouponRecord>` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state))]
pub async fn get_coupons(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<CouponRecord>>, AppError> {
    info!("Fetching active coupon catalog");

    let coupons = helper::run_query(&state.pool, |conn| {
        coupons_dsl::coupons
            .filter(coupons_dsl::active.eq(true))
            .order(coupons_dsl::points_cost.asc())
            .select((
                coupons_dsl::id,
                coupons_dsl::name,
                coupons_dsl::description,
                coupons_dsl::points_cost,
                coupons_dsl::rank_required,
            ))
            .load::<CouponRecord>(conn)
    })
    .await?;

    info!("Successfully fetched {} active coupons", coupons.len());
    Ok(ApiResponse::ok(coupons))
}

/// Redeems a coupon against the user's spendable balance. The deduction is
/// an atomic check-and-decrement, so concurrent redemptions from multiple
/// sessions can never drive the balance negative: the loser fails with
/// `InsufficientPoints` even if it read a stale balance. Lifetime points
/// (and therefore badge state) are unaffected.
///
/// Request Body: `RedeemCouponPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `RedeemOutcome` (200 OK).
/// * `403 Forbidden`: If the user's rank tier is below the coupon's gate.
/// * `404 Not Found`: If the coupon or profile does not exist.
/// * `422 Unprocessable Entity`: If the coupon is inactive, or the spendable
///   balance does not cover the cost.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(state, payload))]
pub async fn redeem_coupon(
    State(state): State<AppState>,
    Json(payload): Json<RedeemCouponPayload>,
) -> Result<ApiResponse<RedeemOutcome>, AppError> {
    let user_id = payload.user_id;
    let coupon_id = payload.coupon_id;

    info!(
        "Attempting redemption of coupon {} by user {}",
        coupon_id, user_id
    );

    let outcome = helper::run_ledger_transaction(&state.pool, move |conn| {
        let (points_cost, rank_required, active) = coupons_dsl::coupons
            .find(coupon_id)
            .select((
                coupons_dsl::points_cost,
                coupons_dsl::rank_required,
                coupons_dsl::active,
            ))
            .first::<(i32, i32, bool)>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Coupon with ID {} not found.", coupon_id))
            })?;

        if !active {
            return Err(AppError::UnprocessableEntity(format!(
                "Coupon {} is no longer available.",
                coupon_id
            )));
        }

        let (lifetime_before, spendable_before) = profiles_dsl::profiles
            .find(user_id)
            .select((profiles_dsl::lifetime_points, profiles_dsl::spendable_points))
            .first::<(i32, i32)>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Profile with ID {} not found.", user_id))
            })?;

        let rank = progression::rank_of(lifetime_before);
        if (rank.index as i32) < rank_required {
            warn!(
                "User {} at rank tier {} attempted coupon {} gated at tier {}",
                user_id, rank.index, coupon_id, rank_required
            );
            return Err(AppError::Forbidden(format!(
                "Coupon {} requires rank tier {}, current tier is {}.",
                coupon_id, rank_required, rank.index
            )));
        }

        // Guarded decrement: the predicate re-evaluates under the row lock,
        // so a concurrent redemption cannot overdraw.
        let updated = diesel::update(
            profiles_dsl::profiles
                .filter(profiles_dsl::id.eq(user_id))
                .filter(profiles_dsl::spendable_points.ge(points_cost)),
        )
        .set((
            profiles_dsl::spendable_points.eq(profiles_dsl::spendable_points - points_cost),
            profiles_dsl::last_active.eq(now),
        ))
        .returning((profiles_dsl::lifetime_points, profiles_dsl::spendable_points))
        .get_result::<(i32, i32)>(conn)
        .optional()?;

        let (lifetime_points, spendable_points) = updated.ok_or_else(|| {
            AppError::InsufficientPoints(format!(
                "Coupon {} costs {} points but only {} are spendable.",
                coupon_id, points_cost, spendable_before
            ))
        })?;

        let event = NewEcoPointEvent {
            user_id,
            event_kind: EventKind::Redemption.as_str().to_string(),
            subject_id: coupon_id,
            points: -points_cost,
        };
        diesel::insert_into(epe_dsl::eco_point_events)
            .values(&event)
            .execute(conn)?;

        Ok(RedeemOutcome {
            coupon_id,
            points_cost,
            lifetime_points,
            spendable_points,
            rank: progression::rank_of(lifetime_points),
        })
    })
    .await?;

    info!(
        "Coupon {} redeemed by user {} for {} points, {} spendable remaining",
        coupon_id, user_id, outcome.points_cost, outcome.spendable_points
    );
    state.notifier.notify(PointsChanged {
        user_id,
        lifetime_points: outcome.lifetime_points,
        spendable_points: outcome.spendable_points,
    });
    Ok(ApiResponse::ok(outcome))
}

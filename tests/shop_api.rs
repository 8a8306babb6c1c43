use axum::http::StatusCode;
use ecolearn_server::model::points::PointsSummary;
use ecolearn_server::model::shop::{CouponRecord, RedeemOutcome};
use ecolearn_server::response::ApiResponse;
use serde_json::{Value, json};

mod helpers;
use helpers::{
    count_events, create_test_coupon, create_test_profile, get_profile_points, set_profile_points,
    setup_test_environment,
};

// get_coupons

#[tokio::test]
async fn test_get_coupons_active_only_cheapest_first() {
    let (server, pool) = setup_test_environment().await;
    let expensive_id = create_test_coupon(&pool, "Tree Planting Kit", 800, 0, true).await;
    let cheap_id = create_test_coupon(&pool, "Seed Packet", 150, 0, true).await;
    let _retired_id = create_test_coupon(&pool, "Retired Coupon", 50, 0, false).await;

    let response = server.get("/shop/get_coupons").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<Vec<CouponRecord>> = response.json();
    let coupons = body.data.expect("coupon list");
    assert_eq!(coupons.len(), 2);
    assert_eq!(coupons[0].id, cheap_id);
    assert_eq!(coupons[0].points_cost, 150);
    assert_eq!(coupons[1].id, expensive_id);
}

// redeem_coupon

#[tokio::test]
async fn test_redeem_coupon_success_spends_only_spendable() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 101, "redeem@test.com", "Redeemer").await;
    set_profile_points(&pool, user_id, 500, 300).await;
    let coupon_id = create_test_coupon(&pool, "Water Bottle", 200, 0, true).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": coupon_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<RedeemOutcome> = response.json();
    let outcome = body.data.expect("redeem outcome");
    assert_eq!(outcome.coupon_id, coupon_id);
    assert_eq!(outcome.points_cost, 200);
    assert_eq!(outcome.lifetime_points, 500);
    assert_eq!(outcome.spendable_points, 100);

    assert_eq!(get_profile_points(&pool, user_id).await, (500, 100));
    assert_eq!(count_events(&pool, user_id, "redemption").await, 1);
}

#[tokio::test]
async fn test_redeem_coupon_insufficient_points() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 102, "redeem_poor@test.com", "Saver").await;
    set_profile_points(&pool, user_id, 500, 100).await;
    let coupon_id = create_test_coupon(&pool, "Bamboo Cutlery", 200, 0, true).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": coupon_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.status_code, 422);
    assert!(body.status_message.contains("200"));

    // Balance untouched, no ledger row.
    assert_eq!(get_profile_points(&pool, user_id).await, (500, 100));
    assert_eq!(count_events(&pool, user_id, "redemption").await, 0);
}

#[tokio::test]
async fn test_redeem_coupon_rank_gate() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 103, "redeem_rank@test.com", "Low Rank").await;
    // 500 lifetime points puts the user at tier 3 (Young Tree).
    set_profile_points(&pool, user_id, 500, 500).await;
    let coupon_id = create_test_coupon(&pool, "Exclusive Tote", 100, 4, true).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": coupon_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.status_code, 403);

    assert_eq!(get_profile_points(&pool, user_id).await, (500, 500));
}

#[tokio::test]
async fn test_redeem_coupon_inactive_unprocessable() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 104, "redeem_inactive@test.com", "Late Shopper").await;
    set_profile_points(&pool, user_id, 500, 500).await;
    let coupon_id = create_test_coupon(&pool, "Expired Promo", 100, 0, false).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": coupon_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(get_profile_points(&pool, user_id).await, (500, 500));
}

#[tokio::test]
async fn test_redeem_coupon_not_found() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 105, "redeem_missing@test.com", "Lost Shopper").await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": 9999 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redeem_coupon_unknown_profile_not_found() {
    let (server, pool) = setup_test_environment().await;
    let coupon_id = create_test_coupon(&pool, "Orphan Coupon", 100, 0, true).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": 9999, "coupon_id": coupon_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redeem_coupon_concurrent_never_overdraws() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 106, "redeem_race@test.com", "Racer").await;
    // Exactly one redemption's worth of spendable points.
    set_profile_points(&pool, user_id, 1000, 200).await;
    let coupon_id = create_test_coupon(&pool, "Race Coupon", 200, 0, true).await;

    let payload = json!({ "user_id": user_id, "coupon_id": coupon_id });
    let (first, second) = tokio::join!(
        async { server.post("/shop/redeem_coupon").json(&payload).await },
        async { server.post("/shop/redeem_coupon").json(&payload).await },
    );

    let mut statuses = [first.status_code(), second.status_code()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::UNPROCESSABLE_ENTITY]);

    assert_eq!(get_profile_points(&pool, user_id).await, (1000, 0));
    assert_eq!(count_events(&pool, user_id, "redemption").await, 1);
}

#[tokio::test]
async fn test_redeem_coupon_preserves_badges_and_rank() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 107, "redeem_badges@test.com", "Badge Keeper").await;
    set_profile_points(&pool, user_id, 1300, 1300).await;
    let coupon_id = create_test_coupon(&pool, "Badge Safe Coupon", 1200, 0, true).await;

    let response = server
        .post("/shop/redeem_coupon")
        .json(&json!({ "user_id": user_id, "coupon_id": coupon_id }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let summary = server
        .get("/points/get_total_points")
        .add_query_param("user_id", user_id)
        .await;
    assert_eq!(summary.status_code(), StatusCode::OK);
    let body: ApiResponse<PointsSummary> = summary.json();
    let summary = body.data.expect("points summary");
    assert_eq!(summary.lifetime_points, 1300);
    assert_eq!(summary.spendable_points, 100);
    // Spending never removes unlocked badges or lowers rank.
    assert_eq!(summary.badges.len(), 3);
    assert_eq!(summary.rank.name, "Forest Friend");
}

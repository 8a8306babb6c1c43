use crate::progression::Rank;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Queryable)]
pub struct CouponRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub points_cost: i32,
    pub rank_required: i32,
}

/// Result of a redemption. Lifetime points are reported unchanged so the
/// client can confirm badge state is unaffected by spending.
#[derive(Deserialize, Serialize, Debug)]
pub struct RedeemOutcome {
    pub coupon_id: i64,
    pub points_cost: i32,
    pub lifetime_points: i32,
    pub spendable_points: i32,
    pub rank: Rank,
}

use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct RedeemCouponPayload {
    pub user_id: i64,
    pub coupon_id: i64,
}

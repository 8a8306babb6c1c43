use crate::cli::Args;
use crate::notify::PointsNotifier;
use crate::storage::ObjectStore;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_keycloak_auth::PassthroughMode;
use axum_keycloak_auth::instance::{KeycloakAuthInstance, KeycloakConfig};
use axum_keycloak_auth::layer::KeycloakAuthLayer;
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use tracing::log::info;
use url::Url;

pub mod cli;
pub mod model;
pub mod notify;
pub mod payloads;
pub mod progression;
pub mod response;
pub mod schema;
pub mod storage;

mod api;
mod errors;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub storage: ObjectStore,
    pub notifier: PointsNotifier,
}

pub fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Initializing Keycloak authentication layer...");
    let keycloak_layer =
        init_protection_layer(args).context("Failed to initialize Keycloak layer")?;

    let state = AppState {
        pool,
        storage: ObjectStore::new(
            args.storage_url.clone(),
            args.storage_api_key.clone(),
            args.task_photo_bucket.clone(),
            args.task_photo_fallback_bucket.clone(),
        ),
        notifier: PointsNotifier::default(),
    };

    info!("Initializing router...");
    Ok(init_router_internal(state, keycloak_layer))
}

pub fn init_test_router(pool: Pool) -> Router {
    init_test_router_with_storage(pool, test_object_store())
}

pub fn init_test_router_with_storage(pool: Pool, storage: ObjectStore) -> Router {
    let state = AppState {
        pool,
        storage,
        notifier: PointsNotifier::default(),
    };

    Router::new()
        .nest("/points", points_routes())
        .nest("/tasks", task_routes())
        .nest("/shop", shop_routes())
        .nest("/profile", profile_routes())
        .with_state(state)
}

fn init_router_internal(state: AppState, keycloak_layer: KeycloakAuthLayer<String>) -> Router {
    let points_api = points_routes().layer(keycloak_layer.clone());
    let task_api = task_routes().layer(keycloak_layer.clone());
    let shop_api = shop_routes().layer(keycloak_layer.clone());
    let profile_api = profile_routes().layer(keycloak_layer.clone());

    Router::new()
        .nest("/points", points_api)
        .nest("/tasks", task_api)
        .nest("/shop", shop_api)
        .nest("/profile", profile_api)
        .with_state(state)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_protection_layer(args: &Args) -> anyhow::Result<KeycloakAuthLayer<String>> {
    let config = KeycloakConfig::builder()
        .server(args.keycloak_server_url.clone())
        .realm(args.keycloak_realm.clone())
        .build();

    let instance = KeycloakAuthInstance::new(config);

    let layer = KeycloakAuthLayer::builder()
        .instance(instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![args.keycloak_audiences.clone()])
        .build();

    Ok(layer)
}

// Points at a port nothing listens on, so test uploads exercise the
// storage-unavailable path deterministically.
fn test_object_store() -> ObjectStore {
    let endpoint = Url::parse("http://127.0.0.1:1/storage/v1").expect("static test endpoint");
    ObjectStore::new(
        endpoint,
        String::new(),
        "task-photos".to_string(),
        "task_photos".to_string(),
    )
}

fn points_routes() -> Router<AppState> {
    Router::new()
        // protected routes go here
        .route("/award_video_points", post(api::points::award_video_points))
        .route("/award_quiz_points", post(api::points::award_quiz_points))
        .route("/get_total_points", get(api::points::get_total_points))
        .route("/get_point_history", get(api::points::get_point_history))
        .route(
            "/subscribe_point_events",
            get(api::points::subscribe_point_events),
        )
    // public routes go here
}

fn task_routes() -> Router<AppState> {
    Router::new()
        // protected routes go here
        .route("/upload_task_photo", post(api::tasks::upload_task_photo))
        .route("/verify_task", post(api::tasks::verify_task))
        .route("/get_task_submission", get(api::tasks::get_task_submission))
    // public routes go here
}

fn shop_routes() -> Router<AppState> {
    Router::new()
        // protected routes go here
        .route("/get_coupons", get(api::shop::get_coupons))
        .route("/redeem_coupon", post(api::shop::redeem_coupon))
    // public routes go here
}

fn profile_routes() -> Router<AppState> {
    Router::new()
        // protected routes go here
        .route("/create_profile", post(api::profile::create_profile))
        .route("/get_profile", get(api::profile::get_profile))
        .route("/get_leaderboard", get(api::profile::get_leaderboard))
    // public routes go here
}

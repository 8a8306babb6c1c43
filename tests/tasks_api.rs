use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use ecolearn_server::model::points::AwardOutcome;
use ecolearn_server::model::tasks::TaskSubmissionRecord;
use ecolearn_server::response::ApiResponse;
use serde_json::{Value, json};

mod helpers;
use helpers::{
    count_events, count_submissions, create_test_lesson, create_test_profile,
    create_test_submission, get_profile_points, get_submission_status, set_profile_points,
    setup_test_environment, setup_test_environment_with_stub_storage,
};

// upload_task_photo

#[tokio::test]
async fn test_upload_task_photo_success_records_submission() {
    let (server, pool) = setup_test_environment_with_stub_storage().await;
    let user_id = create_test_profile(&pool, 111, "upload_ok@test.com", "Happy Uploader").await;
    let lesson_id = create_test_lesson(&pool, "Happy Upload Lesson").await;

    let form = MultipartForm::new()
        .add_text("user_id", user_id.to_string())
        .add_text("lesson_id", lesson_id.to_string())
        .add_part(
            "photo",
            Part::bytes(vec![0x89, 0x50, 0x4E, 0x47]).mime_type("image/png"),
        );

    let response = server.post("/tasks/upload_task_photo").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<TaskSubmissionRecord> = response.json();
    let record = body.data.expect("submission record");
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.lesson_id, lesson_id);
    assert_eq!(record.status, "uploaded");
    assert!(record.photo_path.ends_with(".png"));
    assert!(record.verified_at.is_none());

    assert_eq!(count_submissions(&pool, user_id).await, 1);
}

#[tokio::test]
async fn test_upload_task_photo_reupload_keeps_single_row() {
    let (server, pool) = setup_test_environment_with_stub_storage().await;
    let user_id = create_test_profile(&pool, 112, "reupload@test.com", "Re-Uploader").await;
    let lesson_id = create_test_lesson(&pool, "Reupload Lesson").await;

    let first_form = MultipartForm::new()
        .add_text("user_id", user_id.to_string())
        .add_text("lesson_id", lesson_id.to_string())
        .add_part(
            "photo",
            Part::bytes(vec![0x89, 0x50, 0x4E, 0x47]).mime_type("image/png"),
        );
    let first = server
        .post("/tasks/upload_task_photo")
        .multipart(first_form)
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let body: ApiResponse<TaskSubmissionRecord> = first.json();
    let first_record = body.data.expect("first submission record");

    // Verification in between: the re-upload must drop the row back to
    // `uploaded` and clear the verification timestamp.
    let verify = server
        .post("/tasks/verify_task")
        .json(&json!({ "user_id": user_id, "lesson_id": lesson_id }))
        .await;
    assert_eq!(verify.status_code(), StatusCode::OK);
    assert_eq!(
        get_submission_status(&pool, user_id, lesson_id).await.as_deref(),
        Some("verified")
    );

    let second_form = MultipartForm::new()
        .add_text("user_id", user_id.to_string())
        .add_text("lesson_id", lesson_id.to_string())
        .add_part(
            "photo",
            Part::bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]).mime_type("image/jpeg"),
        );
    let second = server
        .post("/tasks/upload_task_photo")
        .multipart(second_form)
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let body: ApiResponse<TaskSubmissionRecord> = second.json();
    let second_record = body.data.expect("second submission record");

    assert_eq!(second_record.status, "uploaded");
    assert!(second_record.verified_at.is_none());
    assert_ne!(second_record.photo_path, first_record.photo_path);
    assert!(second_record.photo_path.ends_with(".jpg"));

    assert_eq!(count_submissions(&pool, user_id).await, 1);
    // The earlier task award survives the re-upload.
    assert_eq!(count_events(&pool, user_id, "task").await, 1);
}

#[tokio::test]
async fn test_upload_task_photo_storage_unavailable() {
    // The test router points at an unreachable object store, so a complete
    // upload request must surface the storage failure, not a server error.
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 101, "upload@test.com", "Uploader").await;
    let lesson_id = create_test_lesson(&pool, "Upload Lesson").await;

    let form = MultipartForm::new()
        .add_text("user_id", user_id.to_string())
        .add_text("lesson_id", lesson_id.to_string())
        .add_part(
            "photo",
            Part::bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]).mime_type("image/jpeg"),
        );

    let response = server.post("/tasks/upload_task_photo").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.status_code, 503);

    // Nothing recorded when the photo never landed.
    assert!(get_submission_status(&pool, user_id, lesson_id).await.is_none());
}

#[tokio::test]
async fn test_upload_task_photo_missing_field_bad_request() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 102, "upload_bad@test.com", "Bad Uploader").await;

    let form = MultipartForm::new()
        .add_text("user_id", user_id.to_string())
        .add_part(
            "photo",
            Part::bytes(vec![0xFF, 0xD8]).mime_type("image/jpeg"),
        );

    let response = server.post("/tasks/upload_task_photo").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<Value> = response.json();
    assert!(body.status_message.contains("lesson_id"));
}

#[tokio::test]
async fn test_upload_task_photo_non_numeric_id_bad_request() {
    let (server, _pool) = setup_test_environment().await;

    let form = MultipartForm::new()
        .add_text("user_id", "not-a-number")
        .add_text("lesson_id", "1")
        .add_part(
            "photo",
            Part::bytes(vec![0xFF, 0xD8]).mime_type("image/jpeg"),
        );

    let response = server.post("/tasks/upload_task_photo").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<Value> = response.json();
    assert!(body.status_message.contains("user_id"));
}

// verify_task

#[tokio::test]
async fn test_verify_task_success_awards_points() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 201, "verify@test.com", "Verified User").await;
    let lesson_id = create_test_lesson(&pool, "Verify Lesson").await;
    create_test_submission(&pool, user_id, lesson_id, "uploaded").await;

    let response = server
        .post("/tasks/verify_task")
        .json(&json!({ "user_id": user_id, "lesson_id": lesson_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<AwardOutcome> = response.json();
    let outcome = body.data.expect("award outcome");
    assert!(outcome.awarded);
    assert_eq!(outcome.points_delta, 70);
    assert_eq!(outcome.lifetime_points, 70);
    assert_eq!(outcome.spendable_points, 70);

    assert_eq!(
        get_submission_status(&pool, user_id, lesson_id).await.as_deref(),
        Some("verified")
    );
    assert_eq!(count_events(&pool, user_id, "task").await, 1);
}

#[tokio::test]
async fn test_verify_task_twice_is_benign() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 202, "verify_dup@test.com", "Double Verified").await;
    let lesson_id = create_test_lesson(&pool, "Double Verify Lesson").await;
    create_test_submission(&pool, user_id, lesson_id, "uploaded").await;

    let payload = json!({ "user_id": user_id, "lesson_id": lesson_id });

    let first = server.post("/tasks/verify_task").json(&payload).await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = server.post("/tasks/verify_task").json(&payload).await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let body: ApiResponse<AwardOutcome> = second.json();
    let outcome = body.data.expect("award outcome");
    assert!(!outcome.awarded);
    assert_eq!(outcome.points_delta, 0);
    assert_eq!(outcome.lifetime_points, 70);

    assert_eq!(count_events(&pool, user_id, "task").await, 1);
    assert_eq!(get_profile_points(&pool, user_id).await, (70, 70));
}

#[tokio::test]
async fn test_verify_task_without_submission_not_found() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 203, "verify_none@test.com", "No Submission").await;
    let lesson_id = create_test_lesson(&pool, "No Submission Lesson").await;

    let response = server
        .post("/tasks/verify_task")
        .json(&json!({ "user_id": user_id, "lesson_id": lesson_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.status_code, 404);
    assert_eq!(count_events(&pool, user_id, "task").await, 0);
}

#[tokio::test]
async fn test_verify_task_rejected_submission_unprocessable() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 204, "verify_rej@test.com", "Rejected User").await;
    let lesson_id = create_test_lesson(&pool, "Rejected Lesson").await;
    create_test_submission(&pool, user_id, lesson_id, "rejected").await;

    let response = server
        .post("/tasks/verify_task")
        .json(&json!({ "user_id": user_id, "lesson_id": lesson_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ApiResponse<Value> = response.json();
    assert!(body.status_message.contains("rejected"));

    assert_eq!(
        get_submission_status(&pool, user_id, lesson_id).await.as_deref(),
        Some("rejected")
    );
    assert_eq!(count_events(&pool, user_id, "task").await, 0);
}

#[tokio::test]
async fn test_verify_task_crossing_badge_threshold() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 205, "verify_badge@test.com", "Badge Verifier").await;
    let lesson_id = create_test_lesson(&pool, "Badge Verify Lesson").await;
    create_test_submission(&pool, user_id, lesson_id, "uploaded").await;
    set_profile_points(&pool, user_id, 1199, 900).await;

    let response = server
        .post("/tasks/verify_task")
        .json(&json!({ "user_id": user_id, "lesson_id": lesson_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<AwardOutcome> = response.json();
    let outcome = body.data.expect("award outcome");
    assert_eq!(outcome.lifetime_points, 1269);
    assert_eq!(outcome.new_badges.len(), 1);
    assert_eq!(outcome.new_badges[0].name, "Green Guardian");
}

// get_task_submission

#[tokio::test]
async fn test_get_task_submission_found() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 301, "get_sub@test.com", "Submission Reader").await;
    let lesson_id = create_test_lesson(&pool, "Get Submission Lesson").await;
    create_test_submission(&pool, user_id, lesson_id, "uploaded").await;

    let response = server
        .get("/tasks/get_task_submission")
        .add_query_param("user_id", user_id)
        .add_query_param("lesson_id", lesson_id)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<Option<TaskSubmissionRecord>> = response.json();
    let record = body.data.flatten().expect("submission record");
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.lesson_id, lesson_id);
    assert_eq!(record.status, "uploaded");
    assert!(record.verified_at.is_none());
}

#[tokio::test]
async fn test_get_task_submission_none_when_missing() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_profile(&pool, 302, "get_none@test.com", "No Reader").await;
    let lesson_id = create_test_lesson(&pool, "Empty Submission Lesson").await;

    let response = server
        .get("/tasks/get_task_submission")
        .add_query_param("user_id", user_id)
        .add_query_param("lesson_id", lesson_id)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<Option<TaskSubmissionRecord>> = response.json();
    assert!(body.data.flatten().is_none());
}

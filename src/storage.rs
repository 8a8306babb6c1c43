use crate::errors::AppError;
use axum::http::StatusCode;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{error, warn};
use url::Url;
use uuid::Uuid;

/// Client for the bucket-based object store holding task photos.
///
/// Deployments have drifted between bucket names over time, so a missing
/// primary bucket falls back to the configured alternate name instead of
/// failing the upload outright.
#[derive(Clone)]
pub struct ObjectStore {
    http: Client,
    endpoint: Url,
    api_key: String,
    bucket: String,
    fallback_bucket: String,
}

/// Storage location of a stored object: (bucket-qualified path, public URL).
pub struct StoredObject {
    pub path: String,
    pub public_url: String,
}

enum UploadFailure {
    BucketMissing,
    Rejected(StatusCode),
    Transport(reqwest::Error),
}

impl ObjectStore {
    pub fn new(endpoint: Url, api_key: String, bucket: String, fallback_bucket: String) -> Self {
        ObjectStore {
            http: Client::new(),
            endpoint,
            api_key,
            bucket,
            fallback_bucket,
        }
    }

    /// Uploads a task photo, trying the fallback bucket if the primary one
    /// is missing. Any other failure surfaces as `StorageUnavailable`.
    pub async fn upload_task_photo(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, AppError> {
        match self
            .upload(&self.bucket, object_name, bytes.clone(), content_type)
            .await
        {
            Ok(()) => Ok(self.stored_object(&self.bucket, object_name)),
            Err(UploadFailure::BucketMissing) => {
                warn!(
                    "Bucket '{}' missing, retrying upload of '{}' against fallback bucket '{}'",
                    self.bucket, object_name, self.fallback_bucket
                );
                self.upload(&self.fallback_bucket, object_name, bytes, content_type)
                    .await
                    .map_err(|failure| failure.into_app_error(&self.fallback_bucket))?;
                Ok(self.stored_object(&self.fallback_bucket, object_name))
            }
            Err(failure) => Err(failure.into_app_error(&self.bucket)),
        }
    }

    /// Public (unauthenticated) URL for a stored object.
    pub fn public_url(&self, bucket: &str, object_name: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            bucket,
            object_name
        )
    }

    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadFailure> {
        let url = format!(
            "{}/object/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            bucket,
            object_name
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, content_type)
            // Re-submission overwrites the prior photo for the same object.
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(UploadFailure::Transport)?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match status {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(UploadFailure::BucketMissing),
            status => Err(UploadFailure::Rejected(status)),
        }
    }

    fn stored_object(&self, bucket: &str, object_name: &str) -> StoredObject {
        StoredObject {
            path: format!("{}/{}", bucket, object_name),
            public_url: self.public_url(bucket, object_name),
        }
    }
}

impl UploadFailure {
    fn into_app_error(self, bucket: &str) -> AppError {
        match self {
            UploadFailure::BucketMissing => {
                error!("Bucket '{}' not found in object store", bucket);
                AppError::StorageUnavailable(format!(
                    "Photo storage bucket '{}' is not available",
                    bucket
                ))
            }
            UploadFailure::Rejected(status) => {
                error!(
                    "Object store rejected upload to bucket '{}' with status {}",
                    bucket, status
                );
                AppError::StorageUnavailable(format!(
                    "Photo storage rejected the upload (status {})",
                    status
                ))
            }
            UploadFailure::Transport(err) => {
                error!("Object store request failed: {:?}", err);
                AppError::StorageUnavailable(
                    "Photo storage could not be reached, please retry".to_string(),
                )
            }
        }
    }
}

/// Object name for a task photo, unique per upload so stale CDN caches never
/// serve a replaced photo.
pub fn task_photo_object_name(user_id: i64, lesson_id: i64, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        user_id,
        lesson_id,
        Uuid::new_v4(),
        extension
    )
}

/// File extension for the photo content types the upload form accepts.
pub fn photo_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

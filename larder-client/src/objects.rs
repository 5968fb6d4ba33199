//! Object storage for recipe images.

use std::time::Duration;

use async_trait::async_trait;
use larder_core::{LarderResult, NetworkError};
use larder_storage::ObjectStore;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::api_client::{ApiClient, ErrorContext};

const STORAGE_PREFIX: &str = "/storage/v1";

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Objects in one bucket, addressed by path within it.
#[derive(Debug, Clone)]
pub struct RestObjectStore {
    api: ApiClient,
    bucket: String,
}

impl RestObjectStore {
    pub fn new(api: ApiClient, bucket: impl Into<String>) -> Self {
        Self {
            api,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Absolute URL for a signed path returned by the storage service.
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            return signed.to_string();
        }
        let signed = if signed.starts_with('/') {
            signed.to_string()
        } else {
            format!("/{signed}")
        };
        self.api.url(&format!("{STORAGE_PREFIX}{signed}"))
    }
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> LarderResult<String> {
        let request = self
            .api
            .request(
                Method::POST,
                &format!("{STORAGE_PREFIX}/object/{}/{path}", self.bucket),
            )
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.api
            .send(request, &ErrorContext::Object { path: path.to_string() })
            .await?;
        tracing::debug!(bucket = %self.bucket, %path, "Uploaded object");
        Ok(path.to_string())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> LarderResult<String> {
        let request = self
            .api
            .request(
                Method::POST,
                &format!("{STORAGE_PREFIX}/object/sign/{}/{path}", self.bucket),
            )
            .json(&json!({ "expiresIn": ttl.as_secs() }));
        let signed: SignedUrlResponse = self
            .api
            .send_json(request, &ErrorContext::Object { path: path.to_string() })
            .await?;
        if signed.signed_url.is_empty() {
            return Err(NetworkError::InvalidResponse {
                reason: "empty signed url".to_string(),
            }
            .into());
        }
        Ok(self.absolute_signed_url(&signed.signed_url))
    }
}

//! Shared HTTP plumbing for the hosted backend.
//!
//! Every request carries the project's anon key as `apikey` and a bearer
//! token: the signed-in user's access token when there is one, otherwise the
//! anon key itself. Response statuses are mapped onto [`LarderError`] here so
//! the record, auth and object adapters agree on what a 404 or a 409 means.

use std::sync::{Arc, RwLock};

use larder_core::{AuthError, EntityType, LarderError, LarderResult, NetworkError, ValidationError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },
}

/// What a request was about, for turning failures into domain errors.
#[derive(Debug, Clone)]
pub enum ErrorContext {
    /// Listing a collection.
    Collection(EntityType),
    /// A single row, by id when known.
    Record {
        entity_type: EntityType,
        id: Option<String>,
    },
    /// Authentication endpoints. Bad credentials are auth failures here.
    Auth,
    /// Object storage.
    Object { path: String },
}

impl ErrorContext {
    pub fn record(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::Record {
            entity_type,
            id: Some(id.into()),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("signed_in", &self.access_token().is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            HeaderValue::from_str(&config.anon_key)
                .map_err(|_| ApiClientError::InvalidHeader { name: "apikey" })?,
        );
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Replace the bearer token used for subsequent requests.
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Start a request with the `apikey` and bearer headers set.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, self.url(path))
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Start a request authorised with an explicit token.
    pub fn request_with_token(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Send `request`, turning transport failures and error statuses into
    /// [`LarderError`]s.
    pub async fn send(&self, request: RequestBuilder, context: &ErrorContext) -> LarderResult<Response> {
        let response = request.send().await.map_err(map_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = map_status(status, &body, context);
        tracing::debug!(status = status.as_u16(), ?context, error = %err, "Request failed");
        Err(err)
    }

    /// Send `request` and decode a JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &ErrorContext,
    ) -> LarderResult<T> {
        let response = self.send(request, context).await?;
        read_json(response).await
    }
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> LarderResult<T> {
    response.json::<T>().await.map_err(map_transport)
}

pub fn map_transport(err: reqwest::Error) -> LarderError {
    if err.is_timeout() {
        NetworkError::Timeout.into()
    } else if err.is_decode() {
        NetworkError::InvalidResponse {
            reason: err.to_string(),
        }
        .into()
    } else {
        NetworkError::Transport {
            reason: err.to_string(),
        }
        .into()
    }
}

/// Human-readable message from an error body, whichever service sent it.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn error_code(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("code").and_then(Value::as_str).map(str::to_string)
}

pub fn map_status(status: StatusCode, body: &str, context: &ErrorContext) -> LarderError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    match (status.as_u16(), context) {
        (401, _) if message.contains("JWT expired") => AuthError::SessionExpired.into(),
        (401 | 403, _) => AuthError::Rejected { message }.into(),
        (400 | 422, ErrorContext::Auth) => AuthError::Rejected { message }.into(),
        (400 | 404, ErrorContext::Object { path }) if message.contains("not found") || status == 404 => {
            ValidationError::InvalidValue {
                field: "image_url".to_string(),
                reason: format!("object {path} not found"),
            }
            .into()
        }
        // Single-row requests that matched nothing.
        (404 | 406, ErrorContext::Record { entity_type, id }) => {
            LarderError::not_found(*entity_type, id.clone().unwrap_or_default())
        }
        (400 | 409 | 422, _) => {
            if error_code(body).as_deref() == Some("PGRST116") {
                if let ErrorContext::Record { entity_type, id } = context {
                    return LarderError::not_found(*entity_type, id.clone().unwrap_or_default());
                }
            }
            LarderError::rejected(message)
        }
        (code, _) => NetworkError::Server {
            status: code,
            message,
        }
        .into(),
    }
}

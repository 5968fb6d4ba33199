//! Recipe image workflow.
//!
//! Images live in object storage under `{owner}/{recipe}/{uuid}.{ext}`. The
//! recipe row only stores that path; readers exchange it for a short-lived
//! signed URL, which is cached so list views don't re-sign on every render.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use larder_core::{
    EntityType, LarderError, LarderResult, Patch, Recipe, RecipeId, RecipePatch, RecordIdType,
    UserId, ValidationError,
};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheValue, Freshness, SignedUrl};
use crate::coordinator::MutationCoordinator;
use crate::store::{ObjectStore, RecordStore};

/// Largest accepted upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Signed URL lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    /// How long a cached signed URL is served before it is re-signed.
    pub max_staleness: Duration,
    /// Lifetime requested from object storage. Must exceed `max_staleness`.
    pub url_ttl: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_staleness: Duration::from_secs(45 * 60),
            url_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Object path for a new image of `recipe`.
///
/// The extension is taken from `file_name` (lowercased); names without a
/// usable extension get `img`.
pub fn image_path(owner: &UserId, recipe: &RecipeId, file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "img".to_string());
    format!("{owner}/{recipe}/{}.{ext}", Uuid::new_v4())
}

fn check_upload(bytes: &[u8], content_type: &str) -> Result<(), ValidationError> {
    if !content_type.starts_with("image/") {
        return Err(ValidationError::InvalidValue {
            field: "image".to_string(),
            reason: format!("unsupported content type {content_type}"),
        });
    }
    if bytes.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "image".to_string(),
        });
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::InvalidValue {
            field: "image".to_string(),
            reason: "file size must be less than 5MB".to_string(),
        });
    }
    Ok(())
}

/// Uploads recipe images and resolves their signed URLs.
pub struct RecipeImages<S, O> {
    coordinator: MutationCoordinator<S>,
    objects: Arc<O>,
    config: ImageConfig,
}

impl<S, O> Clone for RecipeImages<S, O> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            objects: Arc::clone(&self.objects),
            config: self.config,
        }
    }
}

impl<S, O> fmt::Debug for RecipeImages<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeImages")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore, O: ObjectStore> RecipeImages<S, O> {
    pub fn new(coordinator: MutationCoordinator<S>, objects: Arc<O>, config: ImageConfig) -> Self {
        Self {
            coordinator,
            objects,
            config,
        }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Upload `bytes` and point `recipe` at the stored object.
    ///
    /// The recipe row picks up the new path optimistically once the upload
    /// succeeds; the returned row is the server's. A failed upload leaves the
    /// recipe untouched.
    pub async fn upload_and_attach(
        &self,
        owner: &UserId,
        recipe: &RecipeId,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> LarderResult<Recipe> {
        if recipe.is_temporary() {
            return Err(ValidationError::UnsavedRecord {
                entity_type: EntityType::Recipe,
                id: recipe.to_string(),
            }
            .into());
        }
        check_upload(&bytes, content_type)?;

        let path = image_path(owner, recipe, file_name);
        let size = bytes.len();
        let stored = self.objects.upload(&path, bytes, content_type).await?;
        tracing::info!(recipe_id = %recipe, path = %stored, size, "Uploaded recipe image");

        let patch = RecipePatch {
            image_url: Patch::Set(stored),
            ..Default::default()
        };
        self.coordinator
            .update::<Recipe>((), recipe.clone(), patch)?
            .wait()
            .await
    }

    /// Detach the image from `recipe`. The stored object is kept.
    pub async fn clear_image(&self, recipe: &RecipeId) -> LarderResult<Recipe> {
        let patch = RecipePatch {
            image_url: Patch::Clear,
            ..Default::default()
        };
        self.coordinator
            .update::<Recipe>((), recipe.clone(), patch)?
            .wait()
            .await
    }

    /// Signed URL for the object at `path`, reused while it is fresh.
    pub async fn signed_url(&self, path: &str) -> LarderResult<String> {
        if path.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "image_url".to_string(),
            }
            .into());
        }

        let cache = self.coordinator.cache();
        let key = CacheKey::signed_image_url(path);
        let freshness = Freshness::best_effort(self.config.max_staleness);
        if let Some(read) = cache.get_read(&key, &freshness) {
            if let CacheValue::SignedUrl(signed) = read.into_value() {
                if signed.expires_at > Utc::now() {
                    return Ok(signed.url);
                }
            }
        }

        let ticket = cache.begin_read(&key);
        let url = self
            .objects
            .create_signed_url(path, self.config.url_ttl)
            .await?;
        let ttl = chrono::Duration::from_std(self.config.url_ttl)
            .map_err(|e| LarderError::internal(format!("invalid signed url ttl: {e}")))?;
        let signed = SignedUrl {
            url: url.clone(),
            expires_at: Utc::now() + ttl,
        };
        if !cache.complete_read(ticket, CacheValue::SignedUrl(signed)) {
            tracing::debug!(%key, "Signed url not cached, read was cancelled");
        }
        Ok(url)
    }
}

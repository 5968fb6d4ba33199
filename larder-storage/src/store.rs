//! Remote collaborator contracts.
//!
//! [`RecordStore`] is the table store behind every entity kind and
//! [`ObjectStore`] holds recipe images. Both are async seams: the HTTP
//! adapters live in `larder-client`, the in-memory record store in
//! [`crate::memory`].

use std::time::Duration;

use async_trait::async_trait;
use larder_core::LarderResult;

use crate::resource::Resource;

/// Table-like CRUD over every [`Resource`].
///
/// Implementations return rows in creation order (ties broken by id),
/// report a missing row as `LarderError::NotFound`, and apply update
/// patches with three-state semantics: absent fields are left untouched,
/// cleared fields are set to null.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// List every row under `parent`.
    async fn list<R: Resource>(&self, parent: &R::Parent) -> LarderResult<Vec<R>>;

    /// Fetch one row by id.
    async fn fetch<R: Resource>(&self, id: &R::Id) -> LarderResult<R>;

    /// Insert a row and return it as stored, with server-assigned fields.
    async fn create<R: Resource>(&self, parent: &R::Parent, draft: &R::Draft) -> LarderResult<R>;

    /// Apply a patch and return the row as stored.
    async fn update<R: Resource>(&self, id: &R::Id, patch: &R::Patch) -> LarderResult<R>;

    /// Delete a row.
    async fn delete<R: Resource>(&self, id: &R::Id) -> LarderResult<()>;
}

/// Object storage for recipe images.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` at `path`, returning the stored path.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> LarderResult<String>;

    /// Create a URL granting read access to `path` for `ttl`.
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> LarderResult<String>;
}

//! Read-through queries.
//!
//! Reads are served from the keyed cache when the entry satisfies the
//! caller's [`Freshness`], otherwise fetched from the record store under a
//! read ticket. A fetch that loses a race with a mutation on the same key is
//! not written back; the caller then receives the cache's current value,
//! which already contains the optimistic change.

use std::fmt;
use std::sync::Arc;

use larder_core::{LarderError, LarderResult};

use crate::cache::{CacheRead, Freshness, KeyedCache};
use crate::resource::Resource;
use crate::store::RecordStore;

/// Cache-first query path over a [`RecordStore`].
pub struct ReadThrough<S> {
    cache: Arc<KeyedCache>,
    store: Arc<S>,
}

impl<S> Clone for ReadThrough<S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> fmt::Debug for ReadThrough<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadThrough")
            .field("cache", &self.cache)
            .finish()
    }
}

impl<S: RecordStore> ReadThrough<S> {
    pub fn new(cache: Arc<KeyedCache>, store: Arc<S>) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        &self.cache
    }

    /// List every `R` under `parent`.
    pub async fn list<R: Resource>(
        &self,
        parent: &R::Parent,
        freshness: Freshness,
    ) -> LarderResult<CacheRead<Vec<R>>> {
        let key = R::collection_key(parent);
        if let Some(read) = self
            .cache
            .get_read(&key, &freshness)
            .and_then(|read| read.map(R::from_collection).transpose())
        {
            return Ok(read);
        }

        let ticket = self.cache.begin_read(&key);
        let rows = self.store.list::<R>(parent).await?;
        tracing::debug!(entity_type = ?R::ENTITY_TYPE, %key, rows = rows.len(), "Fetched collection");

        if self.cache.complete_read(ticket, R::into_collection(rows.clone())) {
            let optimistic = self.cache.pending_count(&key) > 0;
            let visible = self
                .cache
                .get(&key)
                .and_then(R::from_collection)
                .unwrap_or(rows);
            return Ok(CacheRead::from_storage(visible, optimistic));
        }

        // Cancelled by a mutation or an identity switch.
        match self.cache.get(&key).and_then(R::from_collection) {
            Some(visible) => Ok(CacheRead::from_storage(visible, true)),
            None => Ok(CacheRead::from_storage(rows, false)),
        }
    }

    /// Fetch a single `R`.
    ///
    /// Kinds without a single-record key are always fetched. A not-found
    /// answer drops any cached copy before the error is returned.
    pub async fn get<R: Resource>(
        &self,
        id: &R::Id,
        freshness: Freshness,
    ) -> LarderResult<CacheRead<R>> {
        let Some(key) = R::singleton_key(id) else {
            let row = self.store.fetch::<R>(id).await?;
            return Ok(CacheRead::from_storage(row, false));
        };

        if let Some(read) = self
            .cache
            .get_read(&key, &freshness)
            .and_then(|read| read.map(R::from_single).transpose())
        {
            return Ok(read);
        }

        let ticket = self.cache.begin_read(&key);
        let row = match self.store.fetch::<R>(id).await {
            Ok(row) => row,
            Err(error @ LarderError::NotFound { .. }) => {
                self.cache.remove(&key);
                tracing::debug!(%key, "Dropped cached record missing on server");
                return Err(error);
            }
            Err(error) => return Err(error),
        };

        let applied = row
            .clone()
            .into_single()
            .is_some_and(|value| self.cache.complete_read(ticket, value));
        let optimistic = self.cache.pending_count(&key) > 0;
        let visible = if applied || optimistic {
            self.cache.get(&key).and_then(R::from_single).unwrap_or(row)
        } else {
            row
        };
        Ok(CacheRead::from_storage(visible, optimistic))
    }

    /// Mark the collection under `parent` for refetch.
    pub fn invalidate_list<R: Resource>(&self, parent: &R::Parent) -> bool {
        self.cache.invalidate(&R::collection_key(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::memory::{InMemoryRecordStore, StoreOp};
    use larder_core::{Ingredient, IngredientDraft, Recipe, RecipeDraft, RecipeId};
    use std::time::Duration;

    fn setup() -> (ReadThrough<InMemoryRecordStore>, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::default());
        let cache = Arc::new(KeyedCache::default());
        (ReadThrough::new(cache, Arc::clone(&store)), store)
    }

    fn minute() -> Freshness {
        Freshness::best_effort(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (reads, store) = setup();
        let recipe = RecipeId::from("R1");
        store
            .create::<Ingredient>(
                &recipe,
                &IngredientDraft {
                    name: "Salt".into(),
                    quantity: 1.0,
                    unit: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let first = reads.list::<Ingredient>(&recipe, minute()).await.unwrap();
        assert!(first.was_cache_miss());
        assert_eq!(first.value().len(), 1);

        let second = reads.list::<Ingredient>(&recipe, minute()).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(store.call_count(StoreOp::List), 1);

        reads.invalidate_list::<Ingredient>(&recipe);
        reads.list::<Ingredient>(&recipe, minute()).await.unwrap();
        assert_eq!(store.call_count(StoreOp::List), 2);

        reads
            .list::<Ingredient>(&recipe, Freshness::Refetch)
            .await
            .unwrap();
        assert_eq!(store.call_count(StoreOp::List), 3);
    }

    #[tokio::test]
    async fn test_get_caches_single_record() {
        let (reads, store) = setup();
        let created: Recipe = store
            .create(
                &(),
                &RecipeDraft {
                    name: "Soup".into(),
                    serving_size: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let read = reads.get::<Recipe>(&created.id, minute()).await.unwrap();
        assert_eq!(read.into_value(), created);
        assert!(reads.cache().contains(&CacheKey::recipe(&created.id)));

        let again = reads.get::<Recipe>(&created.id, minute()).await.unwrap();
        assert!(again.was_cache_hit());
        assert_eq!(store.call_count(StoreOp::Fetch), 1);
    }

    #[tokio::test]
    async fn test_not_found_clears_cached_record() {
        let (reads, store) = setup();
        let created: Recipe = store
            .create(
                &(),
                &RecipeDraft {
                    name: "Soup".into(),
                    serving_size: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        reads.get::<Recipe>(&created.id, minute()).await.unwrap();

        store.delete::<Recipe>(&created.id).await.unwrap();
        let err = reads
            .get::<Recipe>(&created.id, Freshness::Refetch)
            .await
            .unwrap_err();
        assert!(err.clears_cache_entry());
        assert!(!reads.cache().contains(&CacheKey::recipe(&created.id)));
    }
}

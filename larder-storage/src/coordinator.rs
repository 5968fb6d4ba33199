//! Optimistic mutation coordinator.
//!
//! Every create, update and delete runs the same protocol:
//!
//! 1. validate the input; nothing is touched on failure
//! 2. cancel reads in flight for the target key and fold an optimistic
//!    transform into its visible value
//! 3. queue the remote call behind any earlier mutation on the same key
//! 4. on success reconcile the confirmed value with the server's row, on
//!    failure drop the transform so the visible value is what it would have
//!    been had the mutation never started
//!
//! Steps 1 and 2 happen before the call returns. Steps 3 and 4 run on a
//! spawned task, observed through a [`MutationHandle`]; dropping the handle
//! does not cancel the mutation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use larder_core::{LarderError, LarderResult, RecordIdType, ValidationError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::{CacheKey, CacheValue, KeyedCache, Transform};
use crate::resource::Resource;
use crate::store::RecordStore;

/// Pending result of a mutation.
#[derive(Debug)]
pub struct MutationHandle<T> {
    key: CacheKey,
    temp_id: Option<String>,
    task: JoinHandle<LarderResult<T>>,
}

impl<T> MutationHandle<T> {
    /// Key the optimistic change was applied to.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Id of the placeholder row inserted by a create.
    pub fn temp_id(&self) -> Option<&str> {
        self.temp_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the remote call and cache reconciliation to complete.
    pub async fn wait(self) -> LarderResult<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LarderError::internal(format!("mutation task failed: {e}"))),
        }
    }
}

// ============================================================================
// PER-KEY ORDERING
// ============================================================================

struct LaneTail {
    seq: u64,
    done: oneshot::Receiver<()>,
}

type Lanes = Arc<Mutex<HashMap<CacheKey, LaneTail>>>;

fn lock_lanes(lanes: &Lanes) -> MutexGuard<'_, HashMap<CacheKey, LaneTail>> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Place in the remote-call queue of one key.
///
/// The slot's sender is dropped with the slot, which releases the next
/// mutation on the same key.
struct LaneSlot {
    lanes: Lanes,
    key: CacheKey,
    seq: u64,
    predecessor: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl LaneSlot {
    fn join(lanes: &Lanes, key: &CacheKey, seq: u64) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        let predecessor = lock_lanes(lanes)
            .insert(key.clone(), LaneTail { seq, done: done_rx })
            .map(|tail| tail.done);
        Self {
            lanes: Arc::clone(lanes),
            key: key.clone(),
            seq,
            predecessor,
            _done: done_tx,
        }
    }

    /// Resolve once every earlier mutation on this key has settled.
    async fn turn(&mut self) {
        if let Some(predecessor) = self.predecessor.take() {
            // Err only means the predecessor finished by dropping its sender.
            let _ = predecessor.await;
        }
    }
}

impl Drop for LaneSlot {
    fn drop(&mut self) {
        let mut lanes = lock_lanes(&self.lanes);
        if lanes.get(&self.key).is_some_and(|tail| tail.seq == self.seq) {
            lanes.remove(&self.key);
        }
    }
}

// ============================================================================
// TRANSFORMS
// ============================================================================

/// Apply `edit` to the rows of a collection value; other values pass through.
fn edit_rows<R: Resource>(value: CacheValue, edit: impl FnOnce(&mut Vec<R>)) -> CacheValue {
    match R::from_collection(value.clone()) {
        Some(mut rows) => {
            edit(&mut rows);
            R::into_collection(rows)
        }
        None => value,
    }
}

fn patch_single<R: Resource>(value: CacheValue, patch: &R::Patch) -> CacheValue {
    match R::from_single(value.clone()) {
        Some(mut row) => {
            row.apply_patch(patch);
            row.into_single().unwrap_or(value)
        }
        None => value,
    }
}

fn replace_row<R: Resource>(rows: &mut [R], row: R) {
    if let Some(slot) = rows.iter_mut().find(|existing| existing.id() == row.id()) {
        *slot = row;
    }
}

fn upsert_row<R: Resource>(rows: &mut Vec<R>, row: R) {
    match rows.iter_mut().find(|existing| existing.id() == row.id()) {
        Some(slot) => *slot = row,
        None => rows.push(row),
    }
}

fn reject_unsaved<R: Resource>(id: &R::Id) -> Result<(), ValidationError> {
    if id.is_temporary() {
        return Err(ValidationError::UnsavedRecord {
            entity_type: R::ENTITY_TYPE,
            id: id.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Runs optimistic mutations against a [`RecordStore`] and the shared cache.
///
/// Must be used from within a Tokio runtime.
pub struct MutationCoordinator<S> {
    cache: Arc<KeyedCache>,
    store: Arc<S>,
    lanes: Lanes,
}

impl<S> Clone for MutationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            lanes: Arc::clone(&self.lanes),
        }
    }
}

impl<S> fmt::Debug for MutationCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("cache", &self.cache)
            .field("active_lanes", &lock_lanes(&self.lanes).len())
            .finish()
    }
}

impl<S: RecordStore> MutationCoordinator<S> {
    pub fn new(cache: Arc<KeyedCache>, store: Arc<S>) -> Self {
        Self {
            cache,
            store,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a record under `parent`.
    ///
    /// A placeholder row with a temporary id is appended to the collection
    /// immediately. On success it is replaced by the server's row; on failure
    /// the collection returns to its previous value.
    pub fn create<R: Resource>(
        &self,
        parent: R::Parent,
        draft: R::Draft,
    ) -> LarderResult<MutationHandle<R>> {
        let draft = R::validate_draft(draft)?;
        let key = R::collection_key(&parent);
        let placeholder = R::placeholder(&parent, &draft);
        let temp_id = placeholder.id().to_string();

        let transform: Transform = Arc::new(move |value: CacheValue| {
            edit_rows::<R>(value, |rows| rows.push(placeholder.clone()))
        });
        let ticket = self.cache.begin_mutation(&key, transform);
        let mut slot = LaneSlot::join(&self.lanes, &key, ticket.seq());
        tracing::debug!(entity_type = ?R::ENTITY_TYPE, %key, %temp_id, "Optimistic create");

        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);
        let task_temp_id = temp_id.clone();
        let task = tokio::spawn(async move {
            slot.turn().await;
            let result = store.create::<R>(&parent, &draft).await;
            match &result {
                Ok(created) => {
                    cache.confirm_mutation(&ticket, |value| {
                        edit_rows::<R>(value, |rows| upsert_row(rows, created.clone()))
                    });
                    if cache.is_current(&ticket) {
                        if let Some(single) = R::singleton_key(created.id()) {
                            if cache.contains(&single) {
                                if let Some(value) = created.clone().into_single() {
                                    cache.set(single, value);
                                }
                            }
                        }
                    }
                    tracing::info!(
                        entity_type = ?R::ENTITY_TYPE,
                        temp_id = %task_temp_id,
                        id = %created.id(),
                        "Create confirmed"
                    );
                }
                Err(error) => {
                    cache.rollback_mutation(&ticket);
                    tracing::warn!(
                        entity_type = ?R::ENTITY_TYPE,
                        temp_id = %task_temp_id,
                        %error,
                        "Create failed, rolled back"
                    );
                }
            }
            drop(slot);
            result
        });

        Ok(MutationHandle {
            key,
            temp_id: Some(temp_id),
            task,
        })
    }

    /// Apply `patch` to the record `id` listed under `parent`.
    ///
    /// The patch is merged into the cached row (and the cached single record,
    /// if present) immediately, then both are replaced by the server's row.
    /// Reads of either key in flight when the update starts are discarded.
    /// A not-found failure also drops the cached single record.
    pub fn update<R: Resource>(
        &self,
        parent: R::Parent,
        id: R::Id,
        patch: R::Patch,
    ) -> LarderResult<MutationHandle<R>> {
        reject_unsaved::<R>(&id)?;
        let patch = R::validate_patch(patch)?;
        let key = R::collection_key(&parent);

        let list_transform: Transform = {
            let id = id.clone();
            let patch = patch.clone();
            Arc::new(move |value: CacheValue| {
                edit_rows::<R>(value, |rows| {
                    if let Some(row) = rows.iter_mut().find(|row| *row.id() == id) {
                        row.apply_patch(&patch);
                    }
                })
            })
        };
        let list_ticket = self.cache.begin_mutation(&key, list_transform);

        // Registered even when nothing is cached yet, so a fetch of the
        // record already under way cannot land the pre-update row.
        let single_ticket = R::singleton_key(&id).map(|single| {
            let patch = patch.clone();
            let transform: Transform =
                Arc::new(move |value: CacheValue| patch_single::<R>(value, &patch));
            self.cache.begin_mutation(&single, transform)
        });

        let mut slot = LaneSlot::join(&self.lanes, &key, list_ticket.seq());
        tracing::debug!(entity_type = ?R::ENTITY_TYPE, %key, %id, "Optimistic update");
        let handle_key = key.clone();

        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            slot.turn().await;
            let result = store.update::<R>(&id, &patch).await;
            match &result {
                Ok(updated) => {
                    cache.confirm_mutation(&list_ticket, |value| {
                        edit_rows::<R>(value, |rows| replace_row(rows, updated.clone()))
                    });
                    if let Some(ticket) = &single_ticket {
                        cache.confirm_mutation(ticket, |value| {
                            updated.clone().into_single().unwrap_or(value)
                        });
                    }
                    tracing::info!(entity_type = ?R::ENTITY_TYPE, %id, "Update confirmed");
                }
                Err(error) => {
                    cache.rollback_mutation(&list_ticket);
                    if let Some(ticket) = &single_ticket {
                        cache.rollback_mutation(ticket);
                    }
                    if error.clears_cache_entry() && cache.is_current(&list_ticket) {
                        forget::<R>(&cache, &key, &id);
                    }
                    tracing::warn!(
                        entity_type = ?R::ENTITY_TYPE,
                        %id,
                        %error,
                        "Update failed, rolled back"
                    );
                }
            }
            drop(slot);
            result
        });

        Ok(MutationHandle {
            key: handle_key,
            temp_id: None,
            task,
        })
    }

    /// Delete the record `id` listed under `parent`.
    ///
    /// The row disappears from the collection immediately. On success the
    /// cached single record is dropped and keys derived from the record are
    /// invalidated; on failure the row reappears.
    pub fn delete<R: Resource>(
        &self,
        parent: R::Parent,
        id: R::Id,
    ) -> LarderResult<MutationHandle<()>> {
        reject_unsaved::<R>(&id)?;
        let key = R::collection_key(&parent);

        let transform: Transform = {
            let id = id.clone();
            Arc::new(move |value: CacheValue| {
                edit_rows::<R>(value, |rows| rows.retain(|row| *row.id() != id))
            })
        };
        let ticket = self.cache.begin_mutation(&key, transform);
        if let Some(single) = R::singleton_key(&id) {
            self.cache.cancel_reads(&single);
        }
        let mut slot = LaneSlot::join(&self.lanes, &key, ticket.seq());
        tracing::debug!(entity_type = ?R::ENTITY_TYPE, %key, %id, "Optimistic delete");

        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            slot.turn().await;
            let result = store.delete::<R>(&id).await;
            match &result {
                Ok(()) => {
                    cache.confirm_mutation(&ticket, |value| {
                        edit_rows::<R>(value, |rows| rows.retain(|row| *row.id() != id))
                    });
                    if cache.is_current(&ticket) {
                        if let Some(single) = R::singleton_key(&id) {
                            cache.remove(&single);
                        }
                        for dependent in R::dependent_keys(&id) {
                            cache.invalidate(&dependent);
                        }
                    }
                    tracing::info!(entity_type = ?R::ENTITY_TYPE, %id, "Delete confirmed");
                }
                Err(error) => {
                    cache.rollback_mutation(&ticket);
                    if error.clears_cache_entry() && cache.is_current(&ticket) {
                        forget::<R>(&cache, ticket.key(), &id);
                    }
                    tracing::warn!(
                        entity_type = ?R::ENTITY_TYPE,
                        %id,
                        %error,
                        "Delete failed, rolled back"
                    );
                }
            }
            drop(slot);
            result
        });

        Ok(MutationHandle {
            key,
            temp_id: None,
            task,
        })
    }
}

/// The server no longer knows `id`: drop its single-record entry and mark
/// the collection for refetch.
fn forget<R: Resource>(cache: &KeyedCache, collection: &CacheKey, id: &R::Id) {
    if let Some(single) = R::singleton_key(id) {
        cache.remove(&single);
    }
    cache.invalidate(collection);
}

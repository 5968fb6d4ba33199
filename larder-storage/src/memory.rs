//! In-memory record store.
//!
//! Behaves like the hosted table store as seen through row-level security:
//! rows are stored as JSON documents, stamped with a server id, the current
//! owner and timestamps on insert, and only the current owner's rows are
//! visible. Tests steer it with queued ids, injected failures, a gate that
//! holds every call until released, and a log of issued calls.
//!
//! [`InMemoryObjectStore`] plays the same role for image storage.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use larder_core::{EntityType, LarderError, LarderResult, RecordIdType, UserId};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::resource::{sort_rows, Resource};
use crate::store::{ObjectStore, RecordStore};

/// Record store operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Fetch,
    Create,
    Update,
    Delete,
}

/// One call issued against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub entity_type: EntityType,
    /// Row id for single-row calls, parent scope for listings.
    pub target: Option<String>,
}

/// In-memory [`RecordStore`] for tests and offline use.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<EntityType, Vec<Value>>>,
    owner: RwLock<UserId>,
    queued_ids: Mutex<VecDeque<String>>,
    failures: Mutex<Vec<(StoreOp, LarderError)>>,
    calls: Mutex<Vec<StoreCall>>,
    gate: watch::Sender<bool>,
    latency: Mutex<Duration>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(UserId::from("local-user"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn codec_error(entity_type: EntityType, err: serde_json::Error) -> LarderError {
    LarderError::internal(format!("failed to encode {entity_type:?} row: {err}"))
}

impl InMemoryRecordStore {
    /// Create an empty store whose rows belong to `owner`.
    pub fn new(owner: UserId) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            tables: RwLock::new(HashMap::new()),
            owner: RwLock::new(owner),
            queued_ids: Mutex::new(VecDeque::new()),
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            gate,
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Act as a different signed-in user from now on.
    pub fn set_owner(&self, owner: UserId) {
        *self.owner.write().unwrap_or_else(PoisonError::into_inner) = owner;
    }

    pub fn owner(&self) -> UserId {
        self.owner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Use `id` for the next inserted row instead of a generated one.
    pub fn queue_id(&self, id: impl Into<String>) {
        lock(&self.queued_ids).push_back(id.into());
    }

    /// Fail the next call of kind `op` with `error`.
    pub fn fail_next(&self, op: StoreOp, error: LarderError) {
        lock(&self.failures).push((op, error));
    }

    /// Hold every call after it is logged until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held and future calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Delay every call by `latency` once it passes the gate.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Calls issued so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Number of issued calls of kind `op`.
    pub fn call_count(&self, op: StoreOp) -> usize {
        lock(&self.calls).iter().filter(|call| call.op == op).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Insert rows as-is, bypassing id and timestamp assignment.
    pub fn seed<R: Resource>(&self, rows: impl IntoIterator<Item = R>) -> LarderResult<()> {
        let encoded = rows
            .into_iter()
            .map(|row| serde_json::to_value(&row).map_err(|e| codec_error(R::ENTITY_TYPE, e)))
            .collect::<LarderResult<Vec<_>>>()?;
        self.write_tables()
            .entry(R::ENTITY_TYPE)
            .or_default()
            .extend(encoded);
        Ok(())
    }

    /// Every stored row of kind `R` regardless of owner, in creation order.
    pub fn rows<R: Resource>(&self) -> LarderResult<Vec<R>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows = tables
            .get(&R::ENTITY_TYPE)
            .into_iter()
            .flatten()
            .map(|row| decode::<R>(row.clone()))
            .collect::<LarderResult<Vec<R>>>()?;
        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Number of stored rows of `entity_type` regardless of owner.
    pub fn row_count(&self, entity_type: EntityType) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity_type)
            .map_or(0, Vec::len)
    }

    fn write_tables(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityType, Vec<Value>>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> String {
        lock(&self.queued_ids)
            .pop_front()
            .unwrap_or_else(|| Uuid::now_v7().to_string())
    }

    fn take_failure(&self, op: StoreOp) -> Option<LarderError> {
        let mut failures = lock(&self.failures);
        let position = failures.iter().position(|(failing, _)| *failing == op)?;
        Some(failures.remove(position).1)
    }

    /// Log the call, wait for the gate, then apply latency and injected failures.
    async fn admit(
        &self,
        op: StoreOp,
        entity_type: EntityType,
        target: Option<String>,
    ) -> LarderResult<()> {
        lock(&self.calls).push(StoreCall {
            op,
            entity_type,
            target,
        });

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(LarderError::internal("record store gate closed"));
        }

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.take_failure(op) {
            Some(error) => {
                tracing::debug!(?op, ?entity_type, %error, "Injected record store failure");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

fn decode<R: Resource>(row: Value) -> LarderResult<R> {
    serde_json::from_value(row).map_err(|e| codec_error(R::ENTITY_TYPE, e))
}

fn owned_by(row: &Value, owner: &UserId) -> bool {
    row["owner_id"] == owner.as_str()
}

fn has_id(row: &Value, id: &str) -> bool {
    row["id"] == id
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list<R: Resource>(&self, parent: &R::Parent) -> LarderResult<Vec<R>> {
        let filter = R::parent_filter(parent);
        self.admit(
            StoreOp::List,
            R::ENTITY_TYPE,
            filter.as_ref().map(|(_, value)| value.clone()),
        )
        .await?;

        let owner = self.owner();
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows = tables
            .get(&R::ENTITY_TYPE)
            .into_iter()
            .flatten()
            .filter(|row| owned_by(row, &owner))
            .filter(|row| match &filter {
                Some((column, value)) => row[*column] == value.as_str(),
                None => true,
            })
            .map(|row| decode::<R>(row.clone()))
            .collect::<LarderResult<Vec<R>>>()?;
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn fetch<R: Resource>(&self, id: &R::Id) -> LarderResult<R> {
        self.admit(StoreOp::Fetch, R::ENTITY_TYPE, Some(id.to_string()))
            .await?;

        let owner = self.owner();
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let row = tables
            .get(&R::ENTITY_TYPE)
            .into_iter()
            .flatten()
            .find(|row| has_id(row, id.as_str()) && owned_by(row, &owner))
            .cloned()
            .ok_or_else(|| LarderError::not_found(R::ENTITY_TYPE, id.as_str()))?;
        decode(row)
    }

    async fn create<R: Resource>(&self, parent: &R::Parent, draft: &R::Draft) -> LarderResult<R> {
        self.admit(StoreOp::Create, R::ENTITY_TYPE, None).await?;

        let draft = R::validate_draft(draft.clone())?;
        let mut row = serde_json::to_value(R::placeholder(parent, &draft))
            .map_err(|e| codec_error(R::ENTITY_TYPE, e))?;
        let now = json!(Utc::now());
        row["id"] = json!(self.next_id());
        row["owner_id"] = json!(self.owner().as_str());
        row["created_at"] = now.clone();
        row["updated_at"] = now;

        let created = decode::<R>(row.clone())?;
        self.write_tables()
            .entry(R::ENTITY_TYPE)
            .or_default()
            .push(row);
        tracing::debug!(entity_type = ?R::ENTITY_TYPE, id = %created.id(), "Inserted row");
        Ok(created)
    }

    async fn update<R: Resource>(&self, id: &R::Id, patch: &R::Patch) -> LarderResult<R> {
        self.admit(StoreOp::Update, R::ENTITY_TYPE, Some(id.to_string()))
            .await?;

        let patch = R::validate_patch(patch.clone())?;
        let owner = self.owner();
        let mut tables = self.write_tables();
        let row = tables
            .entry(R::ENTITY_TYPE)
            .or_default()
            .iter_mut()
            .find(|row| has_id(row, id.as_str()) && owned_by(row, &owner))
            .ok_or_else(|| LarderError::not_found(R::ENTITY_TYPE, id.as_str()))?;

        let mut record = decode::<R>(row.clone())?;
        record.apply_patch(&patch);
        let mut updated =
            serde_json::to_value(&record).map_err(|e| codec_error(R::ENTITY_TYPE, e))?;
        updated["updated_at"] = json!(Utc::now());
        *row = updated.clone();
        decode(updated)
    }

    async fn delete<R: Resource>(&self, id: &R::Id) -> LarderResult<()> {
        self.admit(StoreOp::Delete, R::ENTITY_TYPE, Some(id.to_string()))
            .await?;

        let owner = self.owner();
        let mut tables = self.write_tables();
        let rows = tables.entry(R::ENTITY_TYPE).or_default();
        let position = rows
            .iter()
            .position(|row| has_id(row, id.as_str()) && owned_by(row, &owner))
            .ok_or_else(|| LarderError::not_found(R::ENTITY_TYPE, id.as_str()))?;
        rows.remove(position);
        Ok(())
    }
}

// ============================================================================
// OBJECT STORE
// ============================================================================

/// Stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory [`ObjectStore`]. Signed URLs embed a counter so every signing
/// call yields a distinct URL.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    signed: AtomicU64,
    failures: Mutex<VecDeque<LarderError>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Number of signed URLs issued.
    pub fn signed_count(&self) -> u64 {
        self.signed.load(Ordering::Relaxed)
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: LarderError) {
        lock(&self.failures).push_back(error);
    }

    fn take_failure(&self) -> LarderResult<()> {
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> LarderResult<String> {
        self.take_failure()?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                path.to_string(),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        Ok(path.to_string())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> LarderResult<String> {
        self.take_failure()?;
        let known = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path);
        if !known {
            return Err(LarderError::NotFound {
                entity_type: EntityType::Recipe,
                id: path.to_string(),
            });
        }
        let n = self.signed.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!(
            "memory://objects/{path}?token={n}&expires_in={}",
            ttl.as_secs()
        ))
    }
}

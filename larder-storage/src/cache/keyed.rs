//! In-memory keyed cache with an optimistic mutation lane per key.
//!
//! Each entry keeps two values: the last value confirmed by the record store
//! and the visible value, which is the confirmed value with every pending
//! optimistic transform folded over it in start order. Confirming or rolling
//! back a mutation removes its transform and refolds, so a failed mutation
//! never leaves a trace and later pending mutations survive an earlier
//! rollback.
//!
//! Fetches are tracked with [`ReadTicket`]s. Starting a mutation on a key
//! cancels every read in flight for it, and clearing the cache on an identity
//! switch bumps a global epoch that orphans every outstanding ticket.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use larder_core::{Timestamp, UserId};

use super::freshness::{age_of, CacheRead, Freshness};
use super::key::{CacheKey, CacheValue};

/// Optimistic change applied to the value under one key.
pub type Transform = Arc<dyn Fn(CacheValue) -> CacheValue + Send + Sync>;

/// Configuration for the keyed cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum staleness for best-effort reads when not specified.
    pub default_max_staleness: Duration,
    /// Entries older than this are treated as absent unless a mutation is
    /// pending on them.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_staleness: Duration::from_secs(60),
            entry_ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default max staleness.
    pub fn with_max_staleness(mut self, duration: Duration) -> Self {
        self.default_max_staleness = duration;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Best-effort freshness using the configured default staleness.
    pub fn default_freshness(&self) -> Freshness {
        Freshness::best_effort(self.default_max_staleness)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Keys currently holding a visible value.
    pub entry_count: u64,
    /// Optimistic mutations not yet confirmed or rolled back.
    pub pending_mutations: u64,
    /// Number of full invalidations.
    pub invalidations: u64,
    /// Fetch results dropped because their read was cancelled.
    pub discarded_reads: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Handle for a fetch started with [`KeyedCache::begin_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    key: CacheKey,
    generation: u64,
    epoch: u64,
}

impl ReadTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Handle for an optimistic mutation registered on one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTicket {
    key: CacheKey,
    seq: u64,
    epoch: u64,
}

impl MutationTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

struct PendingMutation {
    seq: u64,
    transform: Transform,
}

struct CacheEntry {
    visible: Option<CacheValue>,
    confirmed: Option<CacheValue>,
    pending: VecDeque<PendingMutation>,
    cached_at: Timestamp,
    invalidated: bool,
    read_generation: u64,
}

impl CacheEntry {
    fn new(now: Timestamp) -> Self {
        Self {
            visible: None,
            confirmed: None,
            pending: VecDeque::new(),
            cached_at: now,
            invalidated: false,
            read_generation: 0,
        }
    }

    fn refold(&mut self, key: &CacheKey) {
        self.visible = fold(key, self.confirmed.clone(), &self.pending);
    }

    fn remove_pending(&mut self, seq: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|m| m.seq != seq);
        self.pending.len() != before
    }
}

fn fold(
    key: &CacheKey,
    base: Option<CacheValue>,
    pending: &VecDeque<PendingMutation>,
) -> Option<CacheValue> {
    if pending.is_empty() {
        return base;
    }
    let start = base.or_else(|| key.empty_value())?;
    Some(
        pending
            .iter()
            .fold(start, |value, mutation| (mutation.transform)(value)),
    )
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    epoch: u64,
    /// Last identity observed; the outer `None` means never observed.
    identity: Option<Option<UserId>>,
}

/// Keyed cache shared by queries, the mutation coordinator and the session
/// watcher.
pub struct KeyedCache {
    config: CacheConfig,
    state: RwLock<CacheState>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    discarded_reads: AtomicU64,
}

impl Default for KeyedCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for KeyedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl KeyedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                epoch: 0,
                identity: None,
            }),
            next_seq: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            discarded_reads: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current invalidation epoch. Bumped by every [`invalidate_all`](Self::invalidate_all).
    pub fn epoch(&self) -> u64 {
        self.read_state().epoch
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.pending.is_empty() && age_of(entry.cached_at, Utc::now()) > self.config.entry_ttl
    }

    /// Visible value under `key`, or `None` when absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let state = self.read_state();
        let value = state
            .entries
            .get(key)
            .filter(|entry| !self.is_expired(entry))
            .and_then(|entry| entry.visible.clone());
        self.count_lookup(value.is_some());
        value
    }

    /// Visible value under `key` if it satisfies `freshness`.
    pub fn get_read(&self, key: &CacheKey, freshness: &Freshness) -> Option<CacheRead<CacheValue>> {
        let state = self.read_state();
        let now = Utc::now();
        let read = state.entries.get(key).and_then(|entry| {
            let value = entry.visible.as_ref()?;
            if self.is_expired(entry)
                || !freshness.accepts(age_of(entry.cached_at, now), entry.invalidated)
            {
                return None;
            }
            Some(CacheRead::from_cache(
                value.clone(),
                entry.cached_at,
                !entry.pending.is_empty(),
            ))
        });
        self.count_lookup(read.is_some());
        read
    }

    fn count_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// True if `key` currently holds a visible value.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read_state()
            .entries
            .get(key)
            .is_some_and(|entry| entry.visible.is_some())
    }

    /// True if `key` was invalidated since it was last written.
    pub fn is_invalidated(&self, key: &CacheKey) -> bool {
        self.read_state()
            .entries
            .get(key)
            .is_some_and(|entry| entry.invalidated)
    }

    /// Number of optimistic mutations pending on `key`.
    pub fn pending_count(&self, key: &CacheKey) -> usize {
        self.read_state()
            .entries
            .get(key)
            .map_or(0, |entry| entry.pending.len())
    }

    /// Replace the confirmed value under `key`.
    ///
    /// Pending mutations are refolded over the new value, so an
    /// authoritative refresh never hides an in-flight optimistic change.
    pub fn set(&self, key: CacheKey, value: CacheValue) {
        let mut state = self.write_state();
        Self::write_confirmed(&mut state, key, value);
    }

    fn write_confirmed(state: &mut CacheState, key: CacheKey, value: CacheValue) {
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(Utc::now()));
        entry.confirmed = Some(value);
        entry.invalidated = false;
        entry.cached_at = Utc::now();
        entry.refold(&key);
    }

    /// Apply `updater` to the value under `key`.
    ///
    /// Collection keys that were never populated start from an empty
    /// collection. Returns false, leaving the cache untouched, for an absent
    /// singleton. While mutations are pending the update lands beneath them.
    pub fn update<F>(&self, key: &CacheKey, updater: F) -> bool
    where
        F: FnOnce(CacheValue) -> CacheValue,
    {
        let mut state = self.write_state();
        let existing = state
            .entries
            .get(key)
            .and_then(|entry| entry.confirmed.clone());
        let Some(base) = existing.or_else(|| key.empty_value()) else {
            return false;
        };
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(Utc::now()));
        entry.confirmed = Some(updater(base));
        entry.cached_at = Utc::now();
        entry.refold(key);
        true
    }

    /// Drop the confirmed value under `key` and cancel reads in flight for
    /// it. Pending mutations stay queued.
    pub fn remove(&self, key: &CacheKey) {
        let mut state = self.write_state();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.confirmed = None;
            entry.read_generation += 1;
            entry.refold(key);
        }
    }

    /// Mark `key` as needing a refetch. The visible value stays readable by
    /// callers that do not check freshness.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.write_state();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        }
    }

    /// Drop every entry, pending lane and outstanding read.
    ///
    /// Results of mutations and fetches started before this call are not
    /// written back afterwards.
    pub fn invalidate_all(&self) {
        let mut state = self.write_state();
        self.clear(&mut state);
    }

    fn clear(&self, state: &mut CacheState) {
        let dropped = state.entries.len();
        state.entries.clear();
        state.epoch += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(epoch = state.epoch, dropped, "Cache cleared");
    }

    /// Record the authenticated identity, clearing the cache if it differs
    /// from the last one observed.
    ///
    /// The first observation is adopted without clearing. Returns true if the
    /// cache was cleared.
    pub fn observe_identity(&self, user: Option<&UserId>) -> bool {
        let mut state = self.write_state();
        let next = user.cloned();
        let previous = state.identity.replace(next.clone());
        match previous {
            None => false,
            Some(current) if current == next => false,
            Some(_) => {
                tracing::info!(user_id = ?next, "Identity switched");
                self.clear(&mut state);
                true
            }
        }
    }

    /// Register a fetch for `key`.
    pub fn begin_read(&self, key: &CacheKey) -> ReadTicket {
        let mut state = self.write_state();
        let epoch = state.epoch;
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(Utc::now()));
        ReadTicket {
            key: key.clone(),
            generation: entry.read_generation,
            epoch,
        }
    }

    /// Store a fetch result unless its read was cancelled in the meantime.
    ///
    /// Returns true if the value was applied.
    pub fn complete_read(&self, ticket: ReadTicket, value: CacheValue) -> bool {
        let mut state = self.write_state();
        let current = state.epoch == ticket.epoch
            && state
                .entries
                .get(&ticket.key)
                .is_some_and(|entry| entry.read_generation == ticket.generation);
        if !current {
            self.discarded_reads.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %ticket.key, "Discarded cancelled read");
            return false;
        }
        Self::write_confirmed(&mut state, ticket.key, value);
        true
    }

    /// Cancel every read in flight for `key`.
    pub fn cancel_reads(&self, key: &CacheKey) {
        let mut state = self.write_state();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.read_generation += 1;
        }
    }

    /// Cancel reads on `key` and fold `transform` into its visible value.
    pub(crate) fn begin_mutation(&self, key: &CacheKey, transform: Transform) -> MutationTicket {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.write_state();
        let epoch = state.epoch;
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(Utc::now()));
        entry.read_generation += 1;
        entry.pending.push_back(PendingMutation { seq, transform });
        entry.refold(key);
        MutationTicket {
            key: key.clone(),
            seq,
            epoch,
        }
    }

    /// Retire a successful mutation, folding the server's answer into the
    /// confirmed value through `reconcile`. Reads that overlapped the
    /// mutation are cancelled.
    ///
    /// A key that had never been fetched is marked invalidated afterwards,
    /// since its confirmed value then only knows about this one record.
    /// Returns false if the cache was cleared after the mutation started.
    pub(crate) fn confirm_mutation<F>(&self, ticket: &MutationTicket, reconcile: F) -> bool
    where
        F: FnOnce(CacheValue) -> CacheValue,
    {
        let mut state = self.write_state();
        if state.epoch != ticket.epoch {
            return false;
        }
        let Some(entry) = state.entries.get_mut(&ticket.key) else {
            return false;
        };
        entry.remove_pending(ticket.seq);
        entry.read_generation += 1;
        let never_fetched = entry.confirmed.is_none();
        if let Some(base) = entry.confirmed.take().or_else(|| ticket.key.empty_value()) {
            entry.confirmed = Some(reconcile(base));
            entry.cached_at = Utc::now();
            if never_fetched {
                entry.invalidated = true;
            }
        }
        entry.refold(&ticket.key);
        true
    }

    /// Retire a failed mutation, restoring the visible value to what it would
    /// be had the mutation never started. Reads that overlapped the mutation
    /// are cancelled.
    pub(crate) fn rollback_mutation(&self, ticket: &MutationTicket) -> bool {
        let mut state = self.write_state();
        if state.epoch != ticket.epoch {
            return false;
        }
        let Some(entry) = state.entries.get_mut(&ticket.key) else {
            return false;
        };
        let removed = entry.remove_pending(ticket.seq);
        entry.read_generation += 1;
        entry.refold(&ticket.key);
        removed
    }

    /// False once the cache was cleared after `ticket` was issued.
    pub(crate) fn is_current(&self, ticket: &MutationTicket) -> bool {
        self.read_state().epoch == ticket.epoch
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.read_state();
        let entry_count = state
            .entries
            .values()
            .filter(|entry| entry.visible.is_some())
            .count() as u64;
        let pending_mutations = state
            .entries
            .values()
            .map(|entry| entry.pending.len() as u64)
            .sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            pending_mutations,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            discarded_reads: self.discarded_reads.load(Ordering::Relaxed),
        }
    }
}

//! Freshness contracts for cache reads.
//!
//! Callers state how stale a cached value they are willing to render, and
//! every read comes back wrapped in [`CacheRead`] so the age of the data and
//! whether it still carries unconfirmed local changes stay visible.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Freshness requirement for cache reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Accept cached data up to the specified age.
    ///
    /// Entries that were invalidated are refetched regardless of age.
    BestEffort {
        /// Maximum acceptable staleness for cached data.
        max_staleness: Duration,
    },

    /// Accept cached data only if nothing has invalidated it since it was
    /// written. Age is not considered.
    #[default]
    Consistent,

    /// Always go to the record store.
    Refetch,
}

impl Freshness {
    /// Create a BestEffort freshness with the given max staleness.
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    /// Create a Consistent freshness requirement.
    pub fn consistent() -> Self {
        Self::Consistent
    }

    /// Returns true if this is a BestEffort freshness.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::BestEffort { .. })
    }

    /// Returns true if this is a Consistent freshness.
    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// Get the max staleness for BestEffort, or zero otherwise.
    pub fn max_staleness(&self) -> Duration {
        match self {
            Self::BestEffort { max_staleness } => *max_staleness,
            Self::Consistent | Self::Refetch => Duration::ZERO,
        }
    }

    /// Whether an entry of the given age and invalidation state may be served.
    pub fn accepts(&self, age: Duration, invalidated: bool) -> bool {
        match self {
            Self::BestEffort { max_staleness } => !invalidated && age <= *max_staleness,
            Self::Consistent => !invalidated,
            Self::Refetch => false,
        }
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When this value was cached (or fetched from the record store).
    cached_at: DateTime<Utc>,
    /// Whether this was a cache hit or a fetch.
    was_cache_hit: bool,
    /// Whether the value includes mutations the server has not confirmed.
    optimistic: bool,
}

impl<T> CacheRead<T> {
    /// Create a new cache read from a cache hit.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>, optimistic: bool) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
            optimistic,
        }
    }

    /// Create a new cache read from a record store fetch (cache miss).
    pub fn from_storage(value: T, optimistic: bool) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            was_cache_hit: false,
            optimistic,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Check if the data is fresh as of the given timestamp.
    ///
    /// Returns true if the data was cached at or after the specified time.
    pub fn is_fresh_as_of(&self, timestamp: DateTime<Utc>) -> bool {
        self.cached_at >= timestamp
    }

    /// Duration since the data was cached.
    pub fn staleness(&self) -> Duration {
        age_of(self.cached_at, Utc::now())
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// True while unconfirmed local mutations are folded into the value.
    pub fn is_optimistic(&self) -> bool {
        self.optimistic
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
            optimistic: self.optimistic,
        }
    }
}

impl<T> CacheRead<Option<T>> {
    /// Turn a read of an optional value into an optional read.
    pub fn transpose(self) -> Option<CacheRead<T>> {
        let CacheRead {
            value,
            cached_at,
            was_cache_hit,
            optimistic,
        } = self;
        value.map(|value| CacheRead {
            value,
            cached_at,
            was_cache_hit,
            optimistic,
        })
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Non-negative age between two instants.
pub(crate) fn age_of(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    if now > cached_at {
        (now - cached_at).to_std().unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

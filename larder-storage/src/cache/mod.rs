//! Keyed cache with explicit freshness contracts.
//!
//! Traditional caches hide their staleness. Here callers state their
//! tolerance via [`Freshness`], and reads return [`CacheRead<T>`] carrying
//! the age of the value and whether it still contains unconfirmed
//! optimistic changes.
//!
//! # Isolation
//!
//! The cache remembers the identity it was populated for. Observing a
//! different identity clears every entry and orphans every in-flight read
//! and mutation, so nothing fetched for one user is ever served to another.
//!
//! # Example
//!
//! ```ignore
//! let read = cache.get_read(&CacheKey::Recipes, &Freshness::best_effort(
//!     Duration::from_secs(60),
//! ));
//! if read.as_ref().is_some_and(|r| r.is_optimistic()) {
//!     tracing::debug!("Rendering unconfirmed changes");
//! }
//! ```

pub mod freshness;
pub mod key;
pub mod keyed;

pub use freshness::{CacheRead, Freshness};
pub use key::{CacheKey, CacheValue, SignedUrl};
pub use keyed::{CacheConfig, CacheStats, KeyedCache, MutationTicket, ReadTicket, Transform};

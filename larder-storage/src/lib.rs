//! LARDER Storage - Cache and Mutation Layer
//!
//! Sits between the UI and the hosted record store. Reads go through a keyed
//! cache with explicit freshness contracts; writes are applied to the cache
//! optimistically, sent to the store in issue order per key, then either
//! reconciled with the server's row or rolled back. A session watcher clears
//! the cache whenever the signed-in identity changes.
//!
//! The remote side is reached through the [`RecordStore`] and
//! [`ObjectStore`] traits; HTTP adapters live in `larder-client`, in-memory
//! ones in [`memory`].

pub mod cache;
pub mod coordinator;
pub mod images;
pub mod memory;
pub mod query;
pub mod resource;
pub mod session;
pub mod store;

pub use cache::{
    CacheConfig, CacheKey, CacheRead, CacheStats, CacheValue, Freshness, KeyedCache, ReadTicket,
    SignedUrl,
};
pub use coordinator::{MutationCoordinator, MutationHandle};
pub use images::{image_path, ImageConfig, RecipeImages, MAX_IMAGE_BYTES};
pub use memory::{InMemoryObjectStore, InMemoryRecordStore, StoreCall, StoreOp, StoredObject};
pub use query::ReadThrough;
pub use resource::{sort_rows, Resource};
pub use session::{SessionSubscription, SessionWatcher};
pub use store::{ObjectStore, RecordStore};

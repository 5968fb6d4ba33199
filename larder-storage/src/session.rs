//! Session change notifier.
//!
//! Listens to the auth provider's session events and clears the keyed cache
//! whenever the authenticated identity changes, so data fetched for one user
//! is never served to the next. Token refreshes for the same user leave the
//! cache alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use larder_core::{SessionEvent, UserId};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::cache::KeyedCache;

/// Spawns the task that ties session events to cache invalidation.
pub struct SessionWatcher;

impl SessionWatcher {
    /// Start watching `events`.
    ///
    /// `initial_user` is the identity the cache is currently populated for.
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        cache: Arc<KeyedCache>,
        events: broadcast::Receiver<SessionEvent>,
        initial_user: Option<UserId>,
    ) -> SessionSubscription {
        cache.observe_identity(initial_user.as_ref());

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let switches = Arc::new(AtomicU64::new(0));
        let task_switches = Arc::clone(&switches);

        let handle = tokio::spawn(async move {
            let mut stream = BroadcastStream::new(events);
            tracing::debug!("Session watcher started");
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        tracing::debug!("Session watcher cancelled");
                        break;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(event)) => {
                                if apply_event(&cache, &event) {
                                    task_switches.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                                // Missed events may have switched identity and back.
                                tracing::warn!(skipped, "Session events dropped, clearing cache");
                                cache.invalidate_all();
                                task_switches.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                tracing::info!("Session event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        SessionSubscription {
            cancel: Some(cancel_tx),
            handle: Some(handle),
            switches,
        }
    }
}

/// Clear the cache if `event` moves it to a different identity than the one
/// it holds data for. Returns true if it did.
fn apply_event(cache: &KeyedCache, event: &SessionEvent) -> bool {
    if cache.observe_identity(event.next_user_id()) {
        return true;
    }
    tracing::debug!(
        previous = ?event.previous_user_id,
        user_id = ?event.next_user_id(),
        "Session event for the identity already cached"
    );
    false
}

/// Running session watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct SessionSubscription {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    switches: Arc<AtomicU64>,
}

impl SessionSubscription {
    /// Number of times the watcher cleared the cache.
    pub fn switches(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop watching and wait for the task to exit.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Session watcher task failed");
            }
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

//! Debounced autosave scheduling.
//!
//! Every edit to the active tab (re)arms a per-path inactivity timer. When a
//! timer expires it runs the commit the session handed it. Timers are explicit
//! handles: each is a spawned task guarded by a [`CancellationToken`], tracked
//! by path with a generation id, so a new edit or a closed tab cancels the
//! pending timer deterministically.
//!
//! Saves for one path are serialized through a per-path async lock. A timer
//! that expires while a save for its path is in flight waits for that save to
//! settle before its commit decides whether anything is left to save.
//!
//! Cancellation is timer-level only: once a commit has started, its request
//! runs to completion.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Default inactivity window before an autosave fires.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

type TimerMap = Arc<Mutex<HashMap<String, TimerHandle>>>;

/// Per-path debounce timers and save serialization.
#[derive(Debug)]
pub struct Autosaver {
    delay: Duration,
    timers: TimerMap,
    save_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    next_id: AtomicU64,
}

impl Autosaver {
    /// Create a scheduler with the given inactivity window.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Arc::new(Mutex::new(HashMap::new())),
            save_locks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The inactivity window.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the timer for `path`, cancelling any pending one.
    ///
    /// `on_expiry` runs on a spawned task once `delay` passes without another
    /// `arm` or `cancel` for the same path.
    pub async fn arm<F>(&self, path: &str, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        {
            let mut timers = self.timers.lock().await;
            if let Some(previous) = timers.insert(
                path.to_string(),
                TimerHandle {
                    id,
                    token: token.clone(),
                },
            ) {
                previous.token.cancel();
            }
        }
        tracing::debug!(path = %path, delay = ?self.delay, "autosave armed");

        let timers = Arc::clone(&self.timers);
        let delay = self.delay;
        let path = path.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(path = %path, "autosave timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut timers = timers.lock().await;
                        if timers.get(&path).is_some_and(|t| t.id == id) {
                            timers.remove(&path);
                        }
                    }
                    tracing::debug!(path = %path, "autosave timer expired");
                    on_expiry.await;
                }
            }
        });
    }

    /// Cancel the pending timer for `path`, if any. A commit already running
    /// is not affected.
    pub async fn cancel(&self, path: &str) -> bool {
        let removed = self.timers.lock().await.remove(path);
        match removed {
            Some(handle) => {
                handle.token.cancel();
                tracing::debug!(path = %path, "autosave cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer without waiting for the registry lock.
    ///
    /// Returns false if the registry was busy; those timers then expire on
    /// their own and find nothing to do.
    pub fn try_cancel_all(&self) -> bool {
        match self.timers.try_lock() {
            Ok(mut timers) => {
                for (_, handle) in timers.drain() {
                    handle.token.cancel();
                }
                true
            }
            Err(_) => false,
        }
    }

    /// True if a timer is pending for `path`.
    pub async fn is_pending(&self, path: &str) -> bool {
        self.timers.lock().await.contains_key(path)
    }

    /// Acquire the save lock for `path`, waiting for any in-flight save of the
    /// same path to settle.
    pub async fn lock_path(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.save_locks.lock().await;
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the save lock for `path` if nobody holds or awaits it.
    pub async fn release_path(&self, path: &str) {
        let mut locks = self.save_locks.lock().await;
        if locks.get(path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(path);
        }
    }
}

impl Default for Autosaver {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Job = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Job) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        let make = move || {
            let handle = Arc::clone(&handle);
            Box::pin(async move {
                handle.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let saver = Autosaver::new(Duration::from_secs(2));
        let (count, make) = counter();

        saver.arm("a.rs", make()).await;
        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(saver.is_pending("a.rs").await);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!saver.is_pending("a.rs").await);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_restarts_window() {
        let saver = Autosaver::new(Duration::from_secs(2));
        let (count, make) = counter();

        saver.arm("a.rs", make()).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        saver.arm("a.rs", make()).await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let saver = Autosaver::new(Duration::from_secs(2));
        let (count, make) = counter();

        saver.arm("a.rs", make()).await;
        assert!(saver.cancel("a.rs").await);
        assert!(!saver.cancel("a.rs").await);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn try_cancel_all_clears_everything() {
        let saver = Autosaver::new(Duration::from_secs(2));
        let (count, make) = counter();

        saver.arm("a.rs", make()).await;
        saver.arm("b.rs", make()).await;
        assert!(saver.try_cancel_all());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!saver.is_pending("a.rs").await);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_per_path() {
        let saver = Autosaver::new(Duration::from_secs(2));
        let (count, make) = counter();

        saver.arm("a.rs", make()).await;
        saver.arm("b.rs", make()).await;
        saver.cancel("a.rs").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn path_lock_serializes() {
        let saver = Autosaver::default();
        let guard = saver.lock_path("a.rs").await;

        let pending = saver.lock_path("a.rs");
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut pending)
                .await
                .is_err()
        );

        // Other paths are independent.
        drop(saver.lock_path("b.rs").await);

        drop(guard);
        drop(pending.await);
        saver.release_path("a.rs").await;
        saver.release_path("b.rs").await;
        assert!(saver.save_locks.lock().await.is_empty());
    }
}

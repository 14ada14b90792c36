//! Per-pin fetch exclusion and per-photo download coalescing.

use bytes::Bytes;
use core_library::{PhotoId, PinId};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::ServiceError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Critical sections never panic halfway through an update.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Set of pins with a network fetch in progress.
#[derive(Clone, Default)]
pub(crate) struct InFlightPins {
    pins: Arc<Mutex<HashSet<PinId>>>,
}

impl InFlightPins {
    /// Mark `pin_id` as fetching, or return `None` if it already is.
    pub(crate) fn try_acquire(&self, pin_id: PinId) -> Option<PinFetchGuard> {
        if !lock(&self.pins).insert(pin_id) {
            return None;
        }

        Some(PinFetchGuard {
            pins: Arc::clone(&self.pins),
            pin_id,
        })
    }

    pub(crate) fn contains(&self, pin_id: &PinId) -> bool {
        lock(&self.pins).contains(pin_id)
    }
}

/// Releases the pin when dropped, including when the owning future is cancelled.
pub(crate) struct PinFetchGuard {
    pins: Arc<Mutex<HashSet<PinId>>>,
    pin_id: PinId,
}

impl Drop for PinFetchGuard {
    fn drop(&mut self) {
        lock(&self.pins).remove(&self.pin_id);
        debug!(pin_id = %self.pin_id, "Pin fetch released");
    }
}

pub(crate) type DownloadResult = std::result::Result<Bytes, Arc<ServiceError>>;
type SharedDownload = Shared<BoxFuture<'static, DownloadResult>>;
type WeakDownload = WeakShared<BoxFuture<'static, DownloadResult>>;
type PendingMap = Arc<Mutex<HashMap<PhotoId, WeakDownload>>>;

/// Downloads in progress, keyed by photo.
///
/// The map holds weak handles only: a download lives as long as some caller
/// is still awaiting it.
#[derive(Clone, Default)]
pub(crate) struct DownloadRegistry {
    pending: PendingMap,
}

impl DownloadRegistry {
    /// Join the running download for `photo_id`, or start one with `start`.
    ///
    /// The entry is removed once the download resolves, or once every caller
    /// has dropped it. Callers that joined before it resolved still observe
    /// its result.
    pub(crate) fn join_or_start<F>(&self, photo_id: PhotoId, start: F) -> SharedDownload
    where
        F: FnOnce() -> BoxFuture<'static, DownloadResult>,
    {
        let mut pending = lock(&self.pending);

        if let Some(existing) = pending.get(&photo_id).and_then(WeakShared::upgrade) {
            debug!(photo_id = %photo_id, "Joining in-flight download");
            return existing;
        }

        let download = start();
        let entry = PendingEntry {
            pending: Arc::clone(&self.pending),
            photo_id,
            finished: false,
        };
        let shared = async move {
            let result = download.await;
            entry.finish();
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            pending.insert(photo_id, weak);
        }
        shared
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Owned by the download future; clears its registry slot when the download
/// resolves or is abandoned.
struct PendingEntry {
    pending: PendingMap,
    photo_id: PhotoId,
    finished: bool,
}

impl PendingEntry {
    fn finish(mut self) {
        lock(&self.pending).remove(&self.photo_id);
        self.finished = true;
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // A newer download may already own the slot.
        let mut pending = lock(&self.pending);
        let abandoned = pending
            .get(&self.photo_id)
            .is_some_and(|weak| weak.upgrade().is_none());
        if abandoned {
            pending.remove(&self.photo_id);
            debug!(photo_id = %self.photo_id, "Abandoned download dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pin_guard_releases_on_drop() {
        let pins = InFlightPins::default();
        let pin_id = PinId::new();

        let guard = pins.try_acquire(pin_id).unwrap();
        assert!(pins.contains(&pin_id));
        assert!(pins.try_acquire(pin_id).is_none());

        drop(guard);
        assert!(!pins.contains(&pin_id));
        assert!(pins.try_acquire(pin_id).is_some());
    }

    #[test]
    fn test_distinct_pins_do_not_block() {
        let pins = InFlightPins::default();
        let _a = pins.try_acquire(PinId::new()).unwrap();
        assert!(pins.try_acquire(PinId::new()).is_some());
    }

    #[tokio::test]
    async fn test_guard_released_when_future_cancelled() {
        let pins = InFlightPins::default();
        let pin_id = PinId::new();

        let guard = pins.try_acquire(pin_id).unwrap();
        let task = tokio::spawn(async move {
            let _guard = guard;
            futures::future::pending::<()>().await;
        });

        task.abort();
        let _ = task.await;
        assert!(!pins.contains(&pin_id));
    }

    #[tokio::test]
    async fn test_concurrent_joins_share_one_download() {
        let registry = DownloadRegistry::default();
        let photo_id = PhotoId::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let start = || {
            let starts = Arc::clone(&starts);
            move || {
                starts.fetch_add(1, Ordering::SeqCst);
                async { Ok(Bytes::from_static(b"jpeg")) }.boxed()
            }
        };

        let first = registry.join_or_start(photo_id, start());
        let second = registry.join_or_start(photo_id, start());
        assert_eq!(registry.len(), 1);

        let (a, b) = futures::join!(first, second);
        assert_eq!(a.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(b.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_download_is_not_cached() {
        let registry = DownloadRegistry::default();
        let photo_id = PhotoId::new();

        let failed = registry
            .join_or_start(photo_id, || {
                async {
                    Err(Arc::new(ServiceError::Download(
                        provider_flickr::ApiError::EmptyBody,
                    )))
                }
                .boxed()
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(registry.len(), 0);

        let retried = registry
            .join_or_start(photo_id, || async { Ok(Bytes::from_static(b"ok")) }.boxed())
            .await;
        assert_eq!(retried.unwrap(), Bytes::from_static(b"ok"));
    }

    #[test]
    fn test_abandoned_download_leaves_registry() {
        let registry = DownloadRegistry::default();
        let photo_id = PhotoId::new();

        let stalled = registry.join_or_start(photo_id, || futures::future::pending().boxed());
        let joined = registry.join_or_start(photo_id, || unreachable!("download is running"));
        assert_eq!(registry.len(), 1);

        drop(stalled);
        assert_eq!(registry.len(), 1);
        drop(joined);
        assert_eq!(registry.len(), 0);

        let retried = registry
            .join_or_start(photo_id, || async { Ok(Bytes::from_static(b"ok")) }.boxed());
        assert_eq!(
            futures::executor::block_on(retried).unwrap(),
            Bytes::from_static(b"ok")
        );
        assert_eq!(registry.len(), 0);
    }
}

//! Outcome types for operations that reconcile a local cache with the backend.
//!
//! Wishlist and order containers never return an error to their callers:
//! failures become notifications, and the caller learns what happened from
//! one of these outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Result of a read-through refresh (`load`, `refresh`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cache now reflects the backend.
    Applied,
    /// The request failed; the cache is unchanged and the user was notified.
    Failed,
    /// The identity changed while the request was in flight; the response was dropped.
    Stale,
    /// Nobody is signed in, so nothing was requested.
    Skipped,
}

/// Result of a wishlist mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Failed,
    /// Another mutation for the same product is still in flight.
    Busy,
    /// The caller should send the user to the login form.
    RequiresLogin,
    Stale,
}

impl MutationOutcome {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Counts outstanding requests so a container can report `is_loading`.
#[derive(Debug, Default)]
pub(crate) struct LoadingFlag(AtomicUsize);

impl LoadingFlag {
    /// Mark a request as started until the returned guard drops.
    pub(crate) fn enter(&self) -> LoadingGuard<'_> {
        self.0.fetch_add(1, Ordering::AcqRel);
        LoadingGuard(&self.0)
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }
}

pub(crate) struct LoadingGuard<'a>(&'a AtomicUsize);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A cached list tagged with the identity epoch it was loaded under.
///
/// Reads under any other epoch see an empty list.
#[derive(Debug)]
pub(crate) struct EpochCache<T> {
    inner: RwLock<(u64, Vec<T>)>,
}

impl<T: Clone> EpochCache<T> {
    pub(crate) const fn new() -> Self {
        Self {
            inner: RwLock::new((0, Vec::new())),
        }
    }

    pub(crate) fn replace(&self, epoch: u64, items: Vec<T>) {
        *self.write() = (epoch, items);
    }

    /// Apply `edit` only if the cache was loaded under `epoch`.
    pub(crate) fn edit(&self, epoch: u64, edit: impl FnOnce(&mut Vec<T>)) {
        let mut guard = self.write();
        if guard.0 == epoch {
            edit(&mut guard.1);
        }
    }

    pub(crate) fn read<R>(&self, epoch: u64, read: impl FnOnce(&[T]) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if guard.0 == epoch { read(&guard.1) } else { read(&[]) }
    }

    pub(crate) fn snapshot(&self, epoch: u64) -> Vec<T> {
        self.read(epoch, <[T]>::to_vec)
    }

    pub(crate) fn clear(&self) {
        self.write().1.clear();
    }

    fn write(&self) -> RwLockWriteGuard<'_, (u64, Vec<T>)> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

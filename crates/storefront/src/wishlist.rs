//! The signed-in user's wishlist.
//!
//! The backend owns the list; this is a cache of it. Mutations for one
//! product are serialized: while one is in flight, a second returns
//! [`MutationOutcome::Busy`] without reaching the gateway. Any response that
//! arrives after the identity changed is dropped, and a list loaded for one
//! identity reads as empty under the next.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument, warn};

use souk_core::ProductId;

use crate::error::add_breadcrumb;
use crate::gateway::{Gateway, WishlistEntry};
use crate::notifications::Notifier;
use crate::session::SessionView;
use crate::sync::{EpochCache, LoadingFlag, MutationOutcome, SyncOutcome};

pub struct Wishlist {
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    session: SessionView,
    entries: EpochCache<WishlistEntry>,
    in_flight: Mutex<HashSet<ProductId>>,
    loading: LoadingFlag,
}

/// Releases a product's in-flight claim when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<ProductId>>,
    product_id: ProductId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.product_id);
    }
}

impl Wishlist {
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, notifier: Notifier, session: SessionView) -> Self {
        Self {
            gateway,
            notifier,
            session,
            entries: EpochCache::new(),
            in_flight: Mutex::new(HashSet::new()),
            loading: LoadingFlag::default(),
        }
    }

    /// Replace the cache with the backend's list.
    ///
    /// When nobody is signed in the cache is cleared and nothing is requested.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SyncOutcome {
        if !self.session.is_authenticated() {
            self.reset();
            return SyncOutcome::Skipped;
        }

        let epoch = self.session.epoch();
        let result = {
            let _loading = self.loading.enter();
            self.gateway.wishlist().await
        };

        if self.session.epoch() != epoch {
            debug!("Dropping wishlist response for a previous identity");
            return SyncOutcome::Stale;
        }

        match result {
            Ok(entries) => {
                debug!(count = entries.len(), "Wishlist loaded");
                self.entries.replace(epoch, entries);
                SyncOutcome::Applied
            }
            Err(e) => {
                warn!(error = %e, "Failed to load wishlist");
                self.notifier.error("Failed to load wishlist");
                SyncOutcome::Failed
            }
        }
    }

    /// Save a product, then reload the whole list.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: ProductId) -> MutationOutcome {
        if !self.session.is_authenticated() {
            return MutationOutcome::RequiresLogin;
        }
        let Some(_claim) = self.claim(product_id) else {
            debug!("Wishlist mutation already in flight");
            return MutationOutcome::Busy;
        };

        let epoch = self.session.epoch();
        let result = self.gateway.add_to_wishlist(product_id).await;
        if self.session.epoch() != epoch {
            return MutationOutcome::Stale;
        }

        if let Err(e) = result {
            warn!(error = %e, "Failed to add to wishlist");
            self.notifier.error("Failed to add to wishlist");
            return MutationOutcome::Failed;
        }

        let id = product_id.to_string();
        add_breadcrumb("wishlist", "Added product", Some(&[("product_id", &id)]));

        // The reload reports its own failure
        match self.load().await {
            SyncOutcome::Applied => {
                self.notifier.success("Product added to wishlist");
                MutationOutcome::Applied
            }
            SyncOutcome::Failed => MutationOutcome::Failed,
            SyncOutcome::Stale | SyncOutcome::Skipped => MutationOutcome::Stale,
        }
    }

    /// Delete a product remotely, then drop it from the cache.
    ///
    /// On failure the cache is left exactly as it was.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: ProductId) -> MutationOutcome {
        if !self.session.is_authenticated() {
            return MutationOutcome::RequiresLogin;
        }
        let Some(_claim) = self.claim(product_id) else {
            debug!("Wishlist mutation already in flight");
            return MutationOutcome::Busy;
        };

        let epoch = self.session.epoch();
        let result = self.gateway.remove_from_wishlist(product_id).await;
        if self.session.epoch() != epoch {
            return MutationOutcome::Stale;
        }

        match result {
            Ok(()) => {
                self.entries.edit(epoch, |entries| {
                    entries.retain(|entry| entry.product_id != product_id);
                });

                let id = product_id.to_string();
                add_breadcrumb("wishlist", "Removed product", Some(&[("product_id", &id)]));
                self.notifier.success("Product removed from wishlist");
                MutationOutcome::Applied
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove from wishlist");
                self.notifier.error("Failed to remove from wishlist");
                MutationOutcome::Failed
            }
        }
    }

    /// Remove when saved, add otherwise.
    pub async fn toggle(&self, product_id: ProductId) -> MutationOutcome {
        if self.is_member(product_id) {
            self.remove(product_id).await
        } else {
            self.add(product_id).await
        }
    }

    #[must_use]
    pub fn is_member(&self, product_id: ProductId) -> bool {
        self.entries.read(self.session.epoch(), |entries| {
            entries.iter().any(|e| e.product_id == product_id)
        })
    }

    /// Snapshot of the cached list.
    #[must_use]
    pub fn entries(&self) -> Vec<WishlistEntry> {
        self.entries.snapshot(self.session.epoch())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read(self.session.epoch(), <[WishlistEntry]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// Drop the cache without contacting the backend.
    pub fn reset(&self) {
        self.entries.clear();
    }

    fn claim(&self, product_id: ProductId) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(product_id).then(|| InFlight {
            set: &self.in_flight,
            product_id,
        })
    }
}

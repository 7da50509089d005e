//! Read-only cache of the signed-in user's orders.
//!
//! Orders loaded for one identity read as empty under the next.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use souk_core::OrderId;

use crate::gateway::{Gateway, GatewayError, GatewayResult, Order};
use crate::notifications::Notifier;
use crate::session::SessionView;
use crate::sync::{EpochCache, LoadingFlag, SyncOutcome};

pub struct Orders {
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    session: SessionView,
    orders: EpochCache<Order>,
    loading: LoadingFlag,
}

impl Orders {
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, notifier: Notifier, session: SessionView) -> Self {
        Self {
            gateway,
            notifier,
            session,
            orders: EpochCache::new(),
            loading: LoadingFlag::default(),
        }
    }

    /// Fetch the order list and replace the cache.
    ///
    /// Skipped when nobody is signed in. Failures are reported as an error
    /// notification and leave the cache untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> SyncOutcome {
        if !self.session.is_authenticated() {
            return SyncOutcome::Skipped;
        }

        let epoch = self.session.epoch();
        let result = {
            let _loading = self.loading.enter();
            self.gateway.orders().await
        };

        if self.session.epoch() != epoch {
            debug!("Dropping order list for a previous identity");
            return SyncOutcome::Stale;
        }

        match result {
            Ok(orders) => {
                debug!(count = orders.len(), "Orders refreshed");
                self.orders.replace(epoch, orders);
                SyncOutcome::Applied
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch orders");
                self.notifier.error("Failed to load orders");
                SyncOutcome::Failed
            }
        }
    }

    /// Fetch one order straight from the backend. The cache is not touched.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` when nobody is signed in (nothing is
    /// sent), `NotFound` for an order the user does not own, or the transport
    /// error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn order(&self, order_id: OrderId) -> GatewayResult<Order> {
        if !self.session.is_authenticated() {
            return Err(GatewayError::MissingCredential);
        }
        self.gateway.order(order_id).await
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.orders.snapshot(self.session.epoch())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.orders.read(self.session.epoch(), <[Order]>::len)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn reset(&self) {
        self.orders.clear();
    }
}

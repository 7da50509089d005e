//! The storefront context: one instance owns every state container.
//!
//! Build it once at startup and share it (`Arc<Storefront>`). Identity
//! transitions go through the context so the wishlist and order caches are
//! reset and reloaded for the new identity; the cart is left alone.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::cart::Cart;
use crate::config::StorefrontConfig;
use crate::credential::{CredentialSlot, FileTokenStore, MemoryTokenStore, TokenStore};
use crate::gateway::{
    Gateway, GatewayError, HttpGateway, Identity, OrderItemInput, ProfileUpdate, Registration,
};
use crate::notifications::Notifier;
use crate::orders::Orders;
use crate::session::{Session, SessionError};
use crate::wishlist::Wishlist;

pub struct Storefront {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) session: Session,
    pub(crate) cart: RwLock<Cart>,
    /// Items of the order whose hosted payment is still unconfirmed.
    pub(crate) awaiting_payment: Mutex<Vec<OrderItemInput>>,
    pub(crate) wishlist: Wishlist,
    pub(crate) orders: Orders,
    pub(crate) notifier: Notifier,
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("session", &self.session)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl Storefront {
    /// Build the context from configuration.
    ///
    /// The token is persisted to `token_path` when one is configured and
    /// kept in memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &StorefrontConfig) -> Result<Self, GatewayError> {
        let credential = CredentialSlot::new();
        let gateway = Arc::new(HttpGateway::new(config, credential.clone())?);
        let store: Arc<dyn TokenStore> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };

        Ok(Self::with_gateway(
            gateway,
            credential,
            store,
            config.notification_duration,
        ))
    }

    /// Build the context around any [`Gateway`].
    ///
    /// `credential` must be the slot the gateway reads its token from.
    #[must_use]
    pub fn with_gateway(
        gateway: Arc<dyn Gateway>,
        credential: CredentialSlot,
        store: Arc<dyn TokenStore>,
        notification_duration: Duration,
    ) -> Self {
        let notifier = Notifier::new(notification_duration);
        let session = Session::new(Arc::clone(&gateway), credential, store);
        let wishlist = Wishlist::new(Arc::clone(&gateway), notifier.clone(), session.view());
        let orders = Orders::new(Arc::clone(&gateway), notifier.clone(), session.view());

        Self {
            gateway,
            session,
            cart: RwLock::new(Cart::new()),
            awaiting_payment: Mutex::new(Vec::new()),
            wishlist,
            orders,
            notifier,
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Sign in, then load the wishlist and orders of the new identity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for malformed input (nothing is
    /// sent), `Rejected` when the backend refuses the credentials, and
    /// `Network` when the request could not complete.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let user = self.session.login(email, password).await?;
        self.sync_identity().await;
        Ok(user)
    }

    /// Register, then load the (empty) wishlist and orders.
    ///
    /// # Errors
    ///
    /// Same as [`Storefront::login`].
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: &Registration) -> Result<Identity, SessionError> {
        let user = self.session.register(form).await?;
        self.sync_identity().await;
        Ok(user)
    }

    /// Resume a stored session; stays anonymous on any failure.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Option<Identity> {
        let user = self.session.restore_session().await?;
        self.sync_identity().await;
        Some(user)
    }

    /// Sign out and drop the per-user caches. The cart is kept.
    pub fn logout(&self) {
        self.session.logout();
        self.wishlist.reset();
        self.orders.reset();
    }

    /// Save profile changes and refresh the held identity.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name, otherwise as [`Storefront::login`].
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity, SessionError> {
        self.session.update_profile(update).await
    }

    async fn sync_identity(&self) {
        self.wishlist.reset();
        self.orders.reset();
        let (wishlist, orders) = tokio::join!(self.wishlist.load(), self.orders.refresh());
        debug!(?wishlist, ?orders, "Per-user state reloaded");
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Snapshot of the cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.cart
            .read()
            .map(|cart| cart.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Mutate the cart in place.
    ///
    /// ```rust,ignore
    /// storefront.edit_cart(|cart| cart.add_item(&product, 2));
    /// ```
    pub fn edit_cart<R>(&self, edit: impl FnOnce(&mut Cart) -> R) -> R {
        let mut cart = self.cart.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut cart)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn wishlist(&self) -> &Wishlist {
        &self.wishlist
    }

    #[must_use]
    pub const fn orders(&self) -> &Orders {
        &self.orders
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }
}

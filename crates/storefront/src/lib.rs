//! Souk storefront client library.
//!
//! Client-side state for the Souk marketplace: who is signed in, the local
//! cart, and cached copies of the wishlist and order history kept in step
//! with the backend.
//!
//! # Architecture
//!
//! - [`context::Storefront`] owns every state container; build one per process
//! - All backend traffic goes through the [`gateway::Gateway`] trait
//! - The backend is the source of truth. The only thing persisted locally is
//!   the session token ([`credential::TokenStore`])
//! - Wishlist and order failures surface as [`notifications`], never as errors
//!
//! # Example
//!
//! ```rust,ignore
//! use souk_storefront::{Storefront, StorefrontConfig};
//!
//! let config = StorefrontConfig::from_env()?;
//! let storefront = Storefront::new(&config)?;
//! storefront.restore_session().await;
//!
//! let product = storefront.product("harar-coffee").await?;
//! storefront.edit_cart(|cart| cart.add_item(&product, 2));
//! storefront.wishlist().toggle(product.id).await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
mod catalog;
pub mod checkout;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod notifications;
pub mod orders;
pub mod seller;
pub mod session;
pub mod sync;
pub mod wishlist;

#[cfg(test)]
mod testing;

pub use cart::{Cart, CartLine, CartProduct};
pub use checkout::{CheckoutError, CheckoutForm, CheckoutOutcome, CheckoutSummary, SHIPPING_FEE};
pub use config::{ConfigError, StorefrontConfig};
pub use context::Storefront;
pub use credential::{CredentialSlot, FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
pub use error::{ErrorKind, ValidationError};
pub use gateway::{Gateway, GatewayError, HttpGateway};
pub use notifications::{Notification, NotificationId, Notifier};
pub use seller::SellerError;
pub use session::{Session, SessionError, SessionStatus, SessionView};
pub use sync::{MutationOutcome, SyncOutcome};

//! Remote gateway to the marketplace backend.
//!
//! # Architecture
//!
//! - [`Gateway`] is the seam every state container talks through; tests swap
//!   in a fake, production uses [`HttpGateway`]
//! - The backend is the source of truth for wishlist, orders, and wallet.
//!   Nothing here persists remote data
//! - Product details and categories are cached in memory via `moka`
//!   (5 minute TTL). Seller edits and deletions evict the product
//!
//! # Example
//!
//! ```rust,ignore
//! use souk_storefront::gateway::{Gateway, HttpGateway};
//!
//! let gateway = HttpGateway::new(&config, slot.clone())?;
//! let product = gateway.product("ethiopian-yirgacheffe").await?;
//! gateway.add_to_wishlist(product.id).await?;
//! ```

mod cache;
mod http;
pub mod types;

pub use http::HttpGateway;
pub use types::*;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use souk_core::{OrderId, ProductId};

use crate::error::ErrorKind;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request could not complete (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An authenticated operation was attempted without a token.
    #[error("Not signed in")]
    MissingCredential,

    /// 401 or 403.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other 4xx, with the backend's message.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    /// 5xx.
    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    /// The response body did not have the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request could not be built (bad path, bad form part).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Classify a non-success response.
    #[must_use]
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            s if s.is_client_error() => Self::Rejected { status, message },
            _ => Self::Server { status, message },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential | Self::Unauthorized(_) => ErrorKind::Auth,
            Self::Rejected { .. } | Self::NotFound(_) | Self::InvalidRequest(_) => {
                ErrorKind::Validation
            }
            Self::Http(_) | Self::Server { .. } | Self::Parse(_) => ErrorKind::Network,
        }
    }

    /// The text to show the user: the backend's own message when it sent
    /// one, a generic line otherwise.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized(m) | Self::NotFound(m) if !m.is_empty() => m.clone(),
            Self::Rejected { message, .. } | Self::Server { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            Self::MissingCredential | Self::Unauthorized(_) => "Please log in".to_string(),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every backend operation the storefront performs.
///
/// Operations marked "auth" fail with [`GatewayError::MissingCredential`]
/// when no token is held.
#[async_trait]
pub trait Gateway: Send + Sync {
    // =========================================================================
    // Auth
    // =========================================================================

    async fn register(&self, form: &Registration) -> GatewayResult<AuthPayload>;

    async fn login(&self, credentials: &Credentials) -> GatewayResult<AuthPayload>;

    /// Resolve the identity behind the current token. (auth)
    async fn profile(&self) -> GatewayResult<Identity>;

    /// (auth)
    async fn update_profile(&self, update: &ProfileUpdate) -> GatewayResult<Identity>;

    // =========================================================================
    // Wishlist (auth)
    // =========================================================================

    async fn wishlist(&self) -> GatewayResult<Vec<WishlistEntry>>;

    /// Idempotent on the backend.
    async fn add_to_wishlist(&self, product_id: ProductId) -> GatewayResult<()>;

    /// Idempotent on the backend.
    async fn remove_from_wishlist(&self, product_id: ProductId) -> GatewayResult<()>;

    // =========================================================================
    // Orders & payments (auth)
    // =========================================================================

    async fn orders(&self) -> GatewayResult<Vec<Order>>;

    /// One of the signed-in user's orders.
    async fn order(&self, order_id: OrderId) -> GatewayResult<Order>;

    /// Orders containing the signed-in seller's products.
    async fn seller_orders(&self) -> GatewayResult<Vec<Order>>;

    async fn create_order(&self, order: &NewOrder) -> GatewayResult<OrderId>;

    async fn initialize_payment(&self, order_id: OrderId) -> GatewayResult<PaymentInit>;

    /// Whether the hosted payment with this transaction reference succeeded.
    async fn verify_payment(&self, tx_ref: &str) -> GatewayResult<bool>;

    // =========================================================================
    // Catalog (public)
    // =========================================================================

    async fn products(&self, query: &ProductQuery) -> GatewayResult<Vec<Product>>;

    async fn product(&self, slug: &str) -> GatewayResult<Product>;

    async fn categories(&self) -> GatewayResult<Vec<Category>>;

    // =========================================================================
    // Seller catalog (auth)
    // =========================================================================

    async fn create_product(&self, draft: &ProductDraft) -> GatewayResult<()>;

    /// Replace a listing. Cached copies of the product are dropped.
    async fn update_product(&self, product_id: ProductId, draft: &ProductDraft) -> GatewayResult<()>;

    /// Cached copies of the product are dropped.
    async fn delete_product(&self, product_id: ProductId) -> GatewayResult<()>;

    // =========================================================================
    // Seller wallet (auth)
    // =========================================================================

    async fn wallet(&self) -> GatewayResult<Wallet>;

    async fn withdraw(&self, request: &WithdrawalRequest) -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            GatewayError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            GatewayError::Unauthorized(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::FORBIDDEN, String::new()),
            GatewayError::Unauthorized(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::NOT_FOUND, "gone".into()),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad".into()),
            GatewayError::Rejected { .. }
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            GatewayError::Server { .. }
        ));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(GatewayError::MissingCredential.kind(), ErrorKind::Auth);
        assert_eq!(
            GatewayError::from_status(StatusCode::INTERNAL_SERVER_ERROR, String::new()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            GatewayError::from_status(StatusCode::BAD_REQUEST, "x".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_user_message_prefers_backend_text() {
        let err = GatewayError::from_status(StatusCode::BAD_REQUEST, "Out of stock".into());
        assert_eq!(err.user_message(), "Out of stock");

        let err = GatewayError::from_status(StatusCode::UNAUTHORIZED, String::new());
        assert_eq!(err.user_message(), "Please log in");

        let err = GatewayError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert_eq!(err.user_message(), "Something went wrong, please try again");
    }
}

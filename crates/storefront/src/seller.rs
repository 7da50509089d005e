//! Seller desk: product listings, wallet, payouts, and orders for the
//! seller's products.

use thiserror::Error;
use tracing::{info, instrument};

use souk_core::ProductId;

use crate::context::Storefront;
use crate::error::{ErrorKind, ValidationError, add_breadcrumb};
use crate::gateway::{GatewayError, Order, ProductDraft, Wallet, WithdrawalRequest};

#[derive(Debug, Error)]
pub enum SellerError {
    #[error("A seller account is required")]
    NotSeller,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{}", .0.user_message())]
    Gateway(#[from] GatewayError),
}

impl SellerError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSeller => ErrorKind::Auth,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Gateway(e) => e.kind(),
        }
    }
}

impl Storefront {
    fn require_seller(&self) -> Result<(), SellerError> {
        match self.session.identity() {
            Some(user) if user.role.can_sell() => Ok(()),
            _ => Err(SellerError::NotSeller),
        }
    }

    /// List a new product.
    ///
    /// # Errors
    ///
    /// Returns `NotSeller`, a `ValidationError` (nothing is sent), or the
    /// gateway error.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, draft: &ProductDraft) -> Result<(), SellerError> {
        self.require_seller()?;
        draft.validate()?;

        self.gateway.create_product(draft).await?;
        info!("Product created");
        add_breadcrumb("seller", "Created product", None);
        self.notifier.success("Product created successfully");
        Ok(())
    }

    /// Replace one of the seller's listings.
    ///
    /// # Errors
    ///
    /// Same as [`Storefront::create_product`].
    #[instrument(skip(self, draft), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> Result<(), SellerError> {
        self.require_seller()?;
        draft.validate()?;

        self.gateway.update_product(product_id, draft).await?;
        info!("Product updated");
        let id = product_id.to_string();
        add_breadcrumb("seller", "Updated product", Some(&[("product_id", &id)]));
        self.notifier.success("Product updated successfully");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotSeller` unless a seller is signed in, or the gateway error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<(), SellerError> {
        self.require_seller()?;

        self.gateway.delete_product(product_id).await?;
        info!("Product deleted");
        let id = product_id.to_string();
        add_breadcrumb("seller", "Deleted product", Some(&[("product_id", &id)]));
        self.notifier.success("Product deleted successfully");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotSeller` unless a seller is signed in, or the gateway error.
    #[instrument(skip(self))]
    pub async fn wallet(&self) -> Result<Wallet, SellerError> {
        self.require_seller()?;
        Ok(self.gateway.wallet().await?)
    }

    /// Request a payout. The amount must be positive and the bank details filled in.
    ///
    /// # Errors
    ///
    /// Returns `NotSeller`, a `ValidationError` (nothing is sent), or the
    /// gateway error.
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn withdraw(&self, request: &WithdrawalRequest) -> Result<(), SellerError> {
        self.require_seller()?;
        request.validate()?;

        self.gateway.withdraw(request).await?;
        info!("Withdrawal requested");
        add_breadcrumb("wallet", "Withdrawal requested", None);
        self.notifier.success("Withdrawal request submitted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotSeller` unless a seller is signed in, or the gateway error.
    #[instrument(skip(self))]
    pub async fn seller_orders(&self) -> Result<Vec<Order>, SellerError> {
        self.require_seller()?;
        Ok(self.gateway.seller_orders().await?)
    }
}

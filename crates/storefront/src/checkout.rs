//! Turning the cart into an order.

use std::sync::PoisonError;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument, warn};

use souk_core::{Money, OrderId, PaymentMethod};

use crate::cart::Cart;
use crate::context::Storefront;
use crate::error::{ErrorKind, ValidationError, add_breadcrumb};
use crate::gateway::{GatewayError, NewOrder, ShippingAddress};

/// Flat shipping fee added to every order.
pub const SHIPPING_FEE: Money = Money::new(Decimal::from_parts(50, 0, 0, false, 0));

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{}", .0.user_message())]
    Gateway(#[from] GatewayError),
}

impl CheckoutError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Gateway(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutForm {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Send the buyer to the hosted payment page.
    RedirectToPayment { order_id: OrderId, checkout_url: String },
    /// Cash on delivery, or a hosted payment that could not be started.
    Placed { order_id: OrderId },
}

impl CheckoutOutcome {
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::RedirectToPayment { order_id, .. } | Self::Placed { order_id } => *order_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

impl CheckoutSummary {
    #[must_use]
    pub fn for_cart(cart: &Cart) -> Self {
        let subtotal = cart.total();
        Self {
            subtotal,
            shipping: SHIPPING_FEE,
            total: subtotal + SHIPPING_FEE,
        }
    }
}

impl Storefront {
    #[must_use]
    pub fn checkout_summary(&self) -> CheckoutSummary {
        CheckoutSummary::for_cart(&self.cart())
    }

    /// Submit the cart as an order.
    ///
    /// Input is checked before anything is sent. On any error the cart is
    /// left as it was. Cash-on-delivery orders, and hosted payments that
    /// could not be started, take the submitted items out of the cart right
    /// away. A redirect keeps them until [`Storefront::verify_payment`]
    /// confirms the payment.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for an empty cart or incomplete
    /// address, and `CheckoutError::Gateway` when a request fails.
    #[instrument(skip(self, form), fields(payment_method = %form.payment_method))]
    pub async fn place_order(&self, form: &CheckoutForm) -> Result<CheckoutOutcome, CheckoutError> {
        let items = self.cart().order_items();
        if items.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        form.shipping_address.validate()?;

        let order = NewOrder {
            shipping_address: form.shipping_address.clone(),
            payment_method: form.payment_method,
            items,
        };
        let order_id = self.gateway.create_order(&order).await?;
        info!(order_id = %order_id, "Order created");
        let id = order_id.to_string();
        add_breadcrumb("checkout", "Order created", Some(&[("order_id", &id)]));

        let outcome = match form.payment_method {
            PaymentMethod::Chapa => {
                let payment = self.gateway.initialize_payment(order_id).await?;
                match (payment.success, payment.checkout_url) {
                    (true, Some(checkout_url)) => CheckoutOutcome::RedirectToPayment {
                        order_id,
                        checkout_url,
                    },
                    _ => {
                        warn!(order_id = %order_id, "Payment was not initialized, order stays unpaid");
                        CheckoutOutcome::Placed { order_id }
                    }
                }
            }
            PaymentMethod::Cod => CheckoutOutcome::Placed { order_id },
        };

        self.orders.refresh().await;
        match outcome {
            CheckoutOutcome::RedirectToPayment { .. } => {
                *self
                    .awaiting_payment
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = order.items;
            }
            CheckoutOutcome::Placed { .. } => {
                self.edit_cart(|cart| cart.remove_ordered(&order.items));
                self.notifier.success("Order placed successfully");
            }
        }
        Ok(outcome)
    }

    /// Ask the backend whether a hosted payment went through.
    ///
    /// A confirmed payment takes the items of the order that redirected to
    /// it out of the cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Gateway` when the request fails.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, tx_ref: &str) -> Result<bool, CheckoutError> {
        let paid = self.gateway.verify_payment(tx_ref).await?;
        if paid {
            let items = std::mem::take(
                &mut *self
                    .awaiting_payment
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            self.edit_cart(|cart| cart.remove_ordered(&items));
            self.orders.refresh().await;
        }
        Ok(paid)
    }
}

//! Local shopping cart.
//!
//! The cart is never synchronized with the backend. It lives until the
//! process exits or a checkout succeeds, and it survives login and logout.

use serde::Serialize;

use souk_core::{Money, ProductId};

use crate::gateway::{OrderItemInput, Product, WishlistEntry};

/// The product fields snapshotted into a cart line when it is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartProduct {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub discount_price: Option<Money>,
    pub image: Option<String>,
    pub sku: Option<String>,
    pub slug: Option<String>,
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            discount_price: product.discount_price,
            image: product.primary_image.clone(),
            sku: product.sku.clone(),
            slug: Some(product.slug.clone()),
        }
    }
}

impl From<&WishlistEntry> for CartProduct {
    fn from(entry: &WishlistEntry) -> Self {
        Self {
            product_id: entry.product_id,
            name: entry.name.clone(),
            unit_price: entry.price,
            discount_price: entry.discount_price,
            image: entry.image.clone(),
            sku: None,
            slug: entry.slug.clone(),
        }
    }
}

/// One product in the cart. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub discount_price: Option<Money>,
    pub quantity: u32,
    pub image: Option<String>,
    pub sku: Option<String>,
    pub slug: Option<String>,
}

impl CartLine {
    /// Discount price when set, unit price otherwise.
    #[must_use]
    pub fn effective_price(&self) -> Money {
        self.discount_price.unwrap_or(self.unit_price)
    }

    #[must_use]
    pub fn line_total(&self) -> Money {
        self.effective_price() * self.quantity
    }
}

/// Ordered set of cart lines, unique by product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of a product, merging into its existing line.
    ///
    /// A new line keeps the price seen at the time it was added; merging
    /// only changes the quantity. A quantity of 0 counts as 1.
    pub fn add_item(&mut self, product: impl Into<CartProduct>, quantity: u32) {
        let product = product.into();
        let quantity = quantity.max(1);

        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.product_id == product.product_id)
        {
            line.quantity = line.quantity.saturating_add(quantity);
            return;
        }

        self.lines.push(CartLine {
            product_id: product.product_id,
            name: product.name,
            unit_price: product.unit_price,
            discount_price: product.discount_price,
            quantity,
            image: product.image,
            sku: product.sku,
            slug: product.slug,
        });
    }

    /// Set a line's quantity, clamped to at least 1. Unknown products are ignored.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = quantity.max(1);
        }
    }

    pub fn remove_item(&mut self, product_id: ProductId) {
        self.lines.retain(|line| line.product_id != product_id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Take ordered quantities out of the cart.
    ///
    /// Units added after `items` was taken stay in the cart.
    pub fn remove_ordered(&mut self, items: &[OrderItemInput]) {
        for item in items {
            if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == item.product_id) {
                line.quantity = line.quantity.saturating_sub(item.quantity);
            }
        }
        self.lines.retain(|line| line.quantity > 0);
    }

    /// Sum of line totals, unrounded.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.lines.iter().any(|line| line.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The `{productId, quantity}` pairs sent when placing an order.
    #[must_use]
    pub fn order_items(&self) -> Vec<OrderItemInput> {
        self.lines
            .iter()
            .map(|line| OrderItemInput {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }
}

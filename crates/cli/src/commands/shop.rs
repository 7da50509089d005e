//! Catalog, wishlist, order, and checkout commands.

use souk_core::{OrderId, PaymentMethod, ProductId};
use souk_storefront::gateway::{Order, Product, ProductQuery, ShippingAddress};
use souk_storefront::{CheckoutForm, CheckoutOutcome, MutationOutcome, Storefront};

use super::CliError;

// =============================================================================
// Catalog
// =============================================================================

pub async fn products(storefront: &Storefront, query: &ProductQuery) -> Result<(), CliError> {
    let products = storefront.products(query).await?;
    if products.is_empty() {
        tracing::info!("No products match");
    }
    for product in &products {
        print_product_line(product);
    }
    Ok(())
}

pub async fn product(storefront: &Storefront, slug: &str) -> Result<(), CliError> {
    let product = storefront.product(slug).await?;
    print_product_line(&product);
    if let Some(description) = &product.description {
        tracing::info!("  {description}");
    }
    if let Some(category) = &product.category_name {
        tracing::info!("  Category: {category}");
    }
    if let Some(seller) = &product.seller_name {
        tracing::info!("  Sold by:  {seller}");
    }
    if let Some(stock) = product.stock {
        tracing::info!("  In stock: {stock}");
    }
    Ok(())
}

pub async fn categories(storefront: &Storefront) -> Result<(), CliError> {
    for category in storefront.categories().await? {
        tracing::info!("{:<24} {}", category.slug, category.name);
    }
    Ok(())
}

fn print_product_line(product: &Product) {
    match product.discount_price {
        Some(discount) => tracing::info!(
            "[{}] {} ({}) {} (was {})",
            product.id,
            product.name,
            product.slug,
            discount,
            product.price
        ),
        None => tracing::info!(
            "[{}] {} ({}) {}",
            product.id,
            product.name,
            product.slug,
            product.price
        ),
    }
}

// =============================================================================
// Wishlist
// =============================================================================

pub fn wishlist(storefront: &Storefront) -> Result<(), CliError> {
    require_identity(storefront)?;
    let entries = storefront.wishlist().entries();
    if entries.is_empty() {
        tracing::info!("Your wishlist is empty");
    }
    for entry in entries {
        let price = entry.discount_price.unwrap_or(entry.price);
        tracing::info!("[{}] {} {}", entry.product_id, entry.name, price);
    }
    Ok(())
}

pub async fn wishlist_add(storefront: &Storefront, product_id: ProductId) -> Result<(), CliError> {
    mutation_result(storefront.wishlist().add(product_id).await)
}

pub async fn wishlist_remove(storefront: &Storefront, product_id: ProductId) -> Result<(), CliError> {
    mutation_result(storefront.wishlist().remove(product_id).await)
}

pub async fn wishlist_toggle(storefront: &Storefront, product_id: ProductId) -> Result<(), CliError> {
    mutation_result(storefront.wishlist().toggle(product_id).await)
}

/// Applied mutations have already queued a notification.
const fn mutation_result(outcome: MutationOutcome) -> Result<(), CliError> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::RequiresLogin => Err(CliError::NotSignedIn),
        MutationOutcome::Failed | MutationOutcome::Busy | MutationOutcome::Stale => {
            Err(CliError::Incomplete("Wishlist was not updated"))
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

pub fn orders(storefront: &Storefront) -> Result<(), CliError> {
    require_identity(storefront)?;
    print_orders(&storefront.orders().orders());
    Ok(())
}

pub async fn order(storefront: &Storefront, order_id: OrderId) -> Result<(), CliError> {
    require_identity(storefront)?;
    let order = storefront.orders().order(order_id).await?;
    print_orders(std::slice::from_ref(&order));
    if let Some(city) = &order.city {
        tracing::info!("Ships to {city}");
    }
    Ok(())
}

pub fn print_orders(orders: &[Order]) {
    if orders.is_empty() {
        tracing::info!("No orders yet");
    }
    for order in orders {
        tracing::info!(
            "{} {} {:<10} {} ({} items, {})",
            order.created_at.format("%Y-%m-%d"),
            order.order_number,
            order.status.as_str(),
            order.total,
            order.items_count,
            order.payment_method
        );
    }
}

/// Fill the cart from `slug=quantity` pairs and place the order.
pub async fn checkout(
    storefront: &Storefront,
    items: &[String],
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
) -> Result<(), CliError> {
    require_identity(storefront)?;

    for item in items {
        let (slug, quantity) = parse_item(item)?;
        let product = storefront.product(slug).await?;
        storefront.edit_cart(|cart| cart.add_item(&product, quantity));
    }

    let summary = storefront.checkout_summary();
    tracing::info!("Subtotal: {}", summary.subtotal);
    tracing::info!("Shipping: {}", summary.shipping);
    tracing::info!("Total:    {}", summary.total);

    let form = CheckoutForm {
        shipping_address,
        payment_method,
    };
    match storefront.place_order(&form).await? {
        CheckoutOutcome::RedirectToPayment {
            order_id,
            checkout_url,
        } => {
            tracing::info!("Order {order_id} created. Complete the payment at:");
            tracing::info!("  {checkout_url}");
        }
        CheckoutOutcome::Placed { order_id } => {
            tracing::info!("Order {order_id} placed");
        }
    }
    Ok(())
}

pub async fn verify_payment(storefront: &Storefront, tx_ref: &str) -> Result<(), CliError> {
    if storefront.verify_payment(tx_ref).await? {
        tracing::info!("Payment {tx_ref} confirmed");
        Ok(())
    } else {
        Err(CliError::Incomplete("Payment has not been confirmed"))
    }
}

fn require_identity(storefront: &Storefront) -> Result<(), CliError> {
    if storefront.session().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::NotSignedIn)
    }
}

/// Parse `slug=quantity`, where a bare `slug` means one unit.
fn parse_item(raw: &str) -> Result<(&str, u32), CliError> {
    let invalid = || CliError::InvalidItem(raw.to_string());
    let (slug, quantity) = match raw.split_once('=') {
        Some((slug, quantity)) => (slug.trim(), quantity.trim().parse().map_err(|_| invalid())?),
        None => (raw.trim(), 1),
    };
    if slug.is_empty() || quantity == 0 {
        return Err(invalid());
    }
    Ok((slug, quantity))
}

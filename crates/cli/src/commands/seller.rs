//! Seller desk commands.

use rust_decimal::Decimal;
use souk_core::ProductId;
use souk_storefront::Storefront;
use souk_storefront::gateway::{ProductDraft, WithdrawalRequest};

use super::CliError;
use super::shop::print_orders;

pub async fn create_product(storefront: &Storefront, draft: &ProductDraft) -> Result<(), CliError> {
    storefront.create_product(draft).await?;
    Ok(())
}

pub async fn update_product(
    storefront: &Storefront,
    product_id: ProductId,
    draft: &ProductDraft,
) -> Result<(), CliError> {
    storefront.update_product(product_id, draft).await?;
    Ok(())
}

pub async fn delete_product(storefront: &Storefront, product_id: ProductId) -> Result<(), CliError> {
    storefront.delete_product(product_id).await?;
    Ok(())
}

pub async fn wallet(storefront: &Storefront) -> Result<(), CliError> {
    let wallet = storefront.wallet().await?;
    tracing::info!("Balance: {}", wallet.balance);
    tracing::info!("Pending: {}", wallet.pending_balance);

    for tx in &wallet.transactions {
        let when = tx
            .created_at
            .map_or_else(|| "----------".to_string(), |at| at.format("%Y-%m-%d").to_string());
        tracing::info!(
            "{when} {:<12} {} {}",
            tx.kind,
            tx.amount,
            tx.status.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn withdraw(
    storefront: &Storefront,
    amount: Decimal,
    bank_name: String,
    account_number: String,
) -> Result<(), CliError> {
    let request = WithdrawalRequest {
        amount: amount.into(),
        bank_name,
        account_number,
    };
    storefront.withdraw(&request).await?;
    Ok(())
}

pub async fn orders(storefront: &Storefront) -> Result<(), CliError> {
    print_orders(&storefront.seller_orders().await?);
    Ok(())
}

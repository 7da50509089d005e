//! End-to-end storefront flows over HTTP against the in-process backend.

#![allow(clippy::unwrap_used)]

use souk_core::{CategoryId, Money, OrderId, PaymentMethod, ProductId, Role, Severity};
use souk_integration_tests::MockBackend;
use souk_storefront::gateway::{ProductDraft, ShippingAddress};
use souk_storefront::{
    CheckoutForm, CheckoutOutcome, ErrorKind, GatewayError, MutationOutcome, SellerError,
    SessionError, Storefront,
};

async fn setup() -> (MockBackend, Storefront) {
    let backend = MockBackend::start().await.unwrap();
    let storefront = Storefront::new(&backend.config().unwrap()).unwrap();
    (backend, storefront)
}

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Abebe Kebede".to_string(),
        phone: "+251911000000".to_string(),
        address_line: "Bole Road 12".to_string(),
        city: "Addis Ababa".to_string(),
        state: None,
        postal_code: Some("1000".to_string()),
    }
}

fn errors(storefront: &Storefront) -> Vec<String> {
    storefront
        .notifier()
        .active()
        .into_iter()
        .filter(|n| n.severity == Severity::Error)
        .map(|n| n.message)
        .collect()
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_wrong_password_surfaces_backend_message() {
    let (backend, storefront) = setup().await;
    backend.add_user("buyer@example.com", "secret", "Buyer", Role::Customer);

    let err = storefront.login("buyer@example.com", "nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    match err {
        SessionError::Rejected(message) => assert_eq!(message, "Invalid email or password"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!storefront.session().is_authenticated());
    assert_eq!(backend.hits("GET /wishlist"), 0);
}

#[tokio::test]
async fn test_identity_swap_reloads_per_user_state() {
    let (backend, storefront) = setup().await;
    let alice = backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    let bekele = backend.add_user("bekele@example.com", "pw", "Bekele", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    backend.add_product(2, "Berbere", 120);
    backend.seed_wishlist(alice, 1);
    backend.seed_wishlist(bekele, 2);

    storefront.login("alice@example.com", "pw").await.unwrap();
    assert!(storefront.wishlist().is_member(ProductId::new(1)));

    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 2));

    storefront.logout();
    assert!(storefront.wishlist().is_empty());
    assert_eq!(storefront.cart().count(), 2);

    let user = storefront.login("bekele@example.com", "pw").await.unwrap();
    assert_eq!(user.name, "Bekele");
    assert!(!storefront.wishlist().is_member(ProductId::new(1)));
    assert!(storefront.wishlist().is_member(ProductId::new(2)));
    assert_eq!(storefront.cart().total(), Money::from_major(600));
}

#[tokio::test]
async fn test_session_survives_restart_through_token_file() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("session");
    let backend = MockBackend::start().await.unwrap();
    let user = backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    backend.seed_wishlist(user, 1);
    let config = backend.config_with_token_file(&token_path).unwrap();

    let first = Storefront::new(&config).unwrap();
    first.login("alice@example.com", "pw").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&token_path).unwrap().trim(),
        backend.token_for(user)
    );
    drop(first);

    let second = Storefront::new(&config).unwrap();
    let restored = second.restore_session().await.unwrap();
    assert_eq!(restored.email, "alice@example.com");
    assert!(second.wishlist().is_member(ProductId::new(1)));

    second.logout();
    let third = Storefront::new(&config).unwrap();
    assert!(third.restore_session().await.is_none());
    assert_eq!(backend.hits("GET /auth/profile"), 1);
}

#[tokio::test]
async fn test_rejected_stored_token_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("session");
    std::fs::write(&token_path, "token-999").unwrap();
    let backend = MockBackend::start().await.unwrap();

    let storefront = Storefront::new(&backend.config_with_token_file(&token_path).unwrap()).unwrap();
    assert!(storefront.restore_session().await.is_none());
    assert!(!storefront.session().is_authenticated());
    assert!(!storefront.session().credential().is_present());
    assert!(!token_path.exists() || std::fs::read_to_string(&token_path).unwrap().trim().is_empty());
    assert!(errors(&storefront).is_empty());
}

// ============================================================================
// Wishlist
// ============================================================================

#[tokio::test]
async fn test_wishlist_toggle_round_trip() {
    let (backend, storefront) = setup().await;
    let user = backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(5, "Clay Jebena", 450);
    storefront.login("alice@example.com", "pw").await.unwrap();

    let id = ProductId::new(5);
    assert_eq!(storefront.wishlist().toggle(id).await, MutationOutcome::Applied);
    assert!(storefront.wishlist().is_member(id));
    assert_eq!(backend.remote_wishlist(user), vec![5]);

    assert_eq!(storefront.wishlist().toggle(id).await, MutationOutcome::Applied);
    assert!(!storefront.wishlist().is_member(id));
    assert!(backend.remote_wishlist(user).is_empty());
}

#[tokio::test]
async fn test_failed_remove_keeps_cache_and_notifies_once() {
    let (backend, storefront) = setup().await;
    let user = backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(5, "Clay Jebena", 450);
    backend.seed_wishlist(user, 5);
    storefront.login("alice@example.com", "pw").await.unwrap();
    let before = storefront.wishlist().entries();

    backend.fail("DELETE /wishlist");
    let outcome = storefront.wishlist().remove(ProductId::new(5)).await;

    assert_eq!(outcome, MutationOutcome::Failed);
    assert_eq!(storefront.wishlist().entries(), before);
    assert_eq!(errors(&storefront), vec!["Failed to remove from wishlist"]);
}

#[tokio::test]
async fn test_anonymous_wishlist_add_is_not_sent() {
    let (backend, storefront) = setup().await;
    backend.add_product(5, "Clay Jebena", 450);

    let outcome = storefront.wishlist().add(ProductId::new(5)).await;
    assert_eq!(outcome, MutationOutcome::RequiresLogin);
    assert_eq!(backend.hits("POST /wishlist"), 0);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_cash_on_delivery_checkout() {
    let (backend, storefront) = setup().await;
    backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    backend.add_product(2, "Berbere", 120);
    storefront.login("alice@example.com", "pw").await.unwrap();

    let coffee = storefront.product("harar-coffee").await.unwrap();
    let berbere = storefront.product("berbere").await.unwrap();
    storefront.edit_cart(|cart| {
        cart.add_item(&coffee, 1);
        cart.add_item(&berbere, 2);
        cart.add_item(&coffee, 1);
    });
    assert_eq!(storefront.checkout_summary().total, Money::from_major(890));

    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Cod,
    };
    let outcome = storefront.place_order(&form).await.unwrap();
    assert_eq!(outcome, CheckoutOutcome::Placed { order_id: OrderId::new(1) });
    assert!(storefront.cart().is_empty());
    assert_eq!(backend.hits("POST /payment/initialize"), 0);

    let orders = storefront.orders().orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total, Money::from_major(890));
    assert_eq!(orders[0].items_count, 4);

    let placed = &backend.placed_orders()[0];
    assert_eq!(placed["paymentMethod"], "cod");
    assert_eq!(placed["shippingAddress"]["fullName"], "Abebe Kebede");
    assert_eq!(placed["shippingAddress"]["postalCode"], "1000");
    assert!(placed["shippingAddress"].get("state").is_none());
    assert_eq!(placed["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chapa_checkout_then_verify() {
    let (backend, storefront) = setup().await;
    backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    storefront.login("alice@example.com", "pw").await.unwrap();
    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 1));

    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Chapa,
    };
    let CheckoutOutcome::RedirectToPayment {
        order_id,
        checkout_url,
    } = storefront.place_order(&form).await.unwrap()
    else {
        panic!("expected a payment redirect");
    };
    assert!(checkout_url.ends_with(&format!("tx-ok-{order_id}")));
    assert_eq!(storefront.cart().count(), 1);
    assert_eq!(storefront.orders().count(), 1);

    let paid = storefront
        .verify_payment(&format!("tx-ok-{order_id}"))
        .await
        .unwrap();
    assert!(paid);
    assert!(storefront.cart().is_empty());
    assert_eq!(backend.order_status(order_id.as_i64()), Some("confirmed"));
    assert_eq!(
        storefront.orders().orders()[0].status,
        souk_core::OrderStatus::Confirmed
    );
}

#[tokio::test]
async fn test_chapa_unavailable_places_unpaid_order() {
    let (backend, storefront) = setup().await;
    backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    backend.disable_payments();
    storefront.login("alice@example.com", "pw").await.unwrap();
    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 1));

    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Chapa,
    };
    let outcome = storefront.place_order(&form).await.unwrap();
    assert!(matches!(outcome, CheckoutOutcome::Placed { .. }));
    assert_eq!(storefront.orders().count(), 1);
}

#[tokio::test]
async fn test_failed_order_keeps_cart() {
    let (backend, storefront) = setup().await;
    backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    storefront.login("alice@example.com", "pw").await.unwrap();
    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 3));

    backend.fail("POST /orders");
    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Cod,
    };
    let err = storefront.place_order(&form).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(storefront.cart().count(), 3);
    assert!(backend.placed_orders().is_empty());
}

#[tokio::test]
async fn test_order_lookup_is_scoped_to_owner() {
    let (backend, storefront) = setup().await;
    backend.add_user("alice@example.com", "pw", "Alice", Role::Customer);
    backend.add_user("bekele@example.com", "pw", "Bekele", Role::Customer);
    backend.add_product(1, "Harar Coffee", 300);
    storefront.login("alice@example.com", "pw").await.unwrap();
    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 2));
    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Cod,
    };
    let order_id = storefront.place_order(&form).await.unwrap().order_id();

    let order = storefront.orders().order(order_id).await.unwrap();
    assert_eq!(order.order_number, "SOUK-00001");
    assert_eq!(order.total, Money::from_major(650));
    assert_eq!(order.items_count, 2);

    storefront.login("bekele@example.com", "pw").await.unwrap();
    let err = storefront.orders().order(order_id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(backend.hits("GET /orders/id"), 2);
}

// ============================================================================
// Seller desk
// ============================================================================

fn listing(name: &str, price: i64) -> ProductDraft {
    ProductDraft {
        name: name.to_string(),
        description: Some("Washed, medium roast".to_string()),
        category_id: CategoryId::new(1),
        price: Money::from_major(price),
        discount_price: None,
        stock_quantity: 20,
        weight: Some("500 g".to_string()),
        dimensions: None,
    }
}

#[tokio::test]
async fn test_seller_listing_lifecycle_evicts_cache() {
    let (backend, storefront) = setup().await;
    backend.add_user("shop@example.com", "pw", "Almaz", Role::Seller);
    storefront.login("shop@example.com", "pw").await.unwrap();

    storefront.create_product(&listing("Yirgacheffe", 420)).await.unwrap();
    assert_eq!(backend.listings()[0]["categoryId"], 1);
    assert_eq!(backend.listings()[0]["stockQuantity"], 20);

    let product = storefront.product("yirgacheffe").await.unwrap();
    assert_eq!(product.price, Money::from_major(420));
    assert_eq!(product.seller_name.as_deref(), Some("Almaz Trading"));
    storefront.product("yirgacheffe").await.unwrap();
    assert_eq!(backend.hits("GET /products/slug"), 1);

    storefront
        .update_product(product.id, &listing("Yirgacheffe", 380))
        .await
        .unwrap();
    let updated = storefront.product("yirgacheffe").await.unwrap();
    assert_eq!(updated.price, Money::from_major(380));
    assert_eq!(backend.hits("GET /products/slug"), 2);

    storefront.delete_product(product.id).await.unwrap();
    let err = storefront.product("yirgacheffe").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn test_other_sellers_listing_is_forbidden() {
    let (backend, storefront) = setup().await;
    let owner = backend.add_user("owner@example.com", "pw", "Owner", Role::Seller);
    backend.add_user("rival@example.com", "pw", "Rival", Role::Seller);
    backend.add_product(1, "Harar Coffee", 300);
    backend.assign_seller(1, owner);
    storefront.login("rival@example.com", "pw").await.unwrap();

    let err = storefront.delete_product(ProductId::new(1)).await.unwrap_err();
    assert!(matches!(err, SellerError::Gateway(GatewayError::Unauthorized(_))));
    assert_eq!(err.to_string(), "You can only manage your own products");
    assert!(storefront.product("harar-coffee").await.is_ok());
}

#[tokio::test]
async fn test_seller_wallet_and_orders() {
    let (backend, storefront) = setup().await;
    backend.add_user("buyer@example.com", "pw", "Buyer", Role::Customer);
    let seller = backend.add_user("shop@example.com", "pw", "Almaz", Role::Seller);
    backend.add_product(1, "Harar Coffee", 300);
    backend.assign_seller(1, seller);

    storefront.login("buyer@example.com", "pw").await.unwrap();
    let coffee = storefront.product("harar-coffee").await.unwrap();
    storefront.edit_cart(|cart| cart.add_item(&coffee, 1));
    let form = CheckoutForm {
        shipping_address: address(),
        payment_method: PaymentMethod::Cod,
    };
    storefront.place_order(&form).await.unwrap();

    storefront.login("shop@example.com", "pw").await.unwrap();
    let wallet = storefront.wallet().await.unwrap();
    assert_eq!(wallet.balance, Money::from_major(1200));
    assert_eq!(wallet.transactions.len(), 2);
    assert_eq!(wallet.transactions[1].created_at, None);

    let orders = storefront.seller_orders().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].city.as_deref(), Some("Addis Ababa"));
}

#[tokio::test]
async fn test_withdrawal_rejected_by_backend() {
    let (backend, storefront) = setup().await;
    backend.add_user("shop@example.com", "pw", "Almaz", Role::Seller);
    storefront.login("shop@example.com", "pw").await.unwrap();

    let request = souk_storefront::gateway::WithdrawalRequest {
        amount: Money::from_major(5000),
        bank_name: "Awash Bank".to_string(),
        account_number: "0132000000".to_string(),
    };
    let err = storefront.withdraw(&request).await.unwrap_err();
    assert_eq!(err.to_string(), "Insufficient balance");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(backend.withdrawals().is_empty());

    let request = souk_storefront::gateway::WithdrawalRequest {
        amount: Money::from_major(500),
        ..request
    };
    storefront.withdraw(&request).await.unwrap();
    assert_eq!(backend.withdrawals()[0]["bankName"], "Awash Bank");
}

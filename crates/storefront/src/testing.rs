//! In-memory [`Gateway`] for unit tests.
//!
//! Users are keyed by token, so the fake reads the same [`CredentialSlot`]
//! the session writes, like the HTTP gateway does. Operations can be made to
//! fail or to block until released.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Semaphore;

use souk_core::{Money, OrderId, OrderStatus, ProductId, Role, UserId};

use crate::credential::CredentialSlot;
use crate::gateway::{
    AuthPayload, Category, Credentials, Gateway, GatewayError, GatewayResult, Identity, NewOrder,
    Order, PaymentInit, Product, ProductDraft, ProductQuery, ProfileUpdate, Registration, Wallet,
    WishlistEntry, WithdrawalRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Register,
    Login,
    Profile,
    UpdateProfile,
    Wishlist,
    AddToWishlist,
    RemoveFromWishlist,
    Orders,
    Order,
    SellerOrders,
    CreateOrder,
    InitializePayment,
    VerifyPayment,
    Products,
    Product,
    Categories,
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    Wallet,
    Withdraw,
}

struct Account {
    password: String,
    identity: Identity,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    next_user: i64,
    next_order: i64,
    catalog: Vec<Product>,
    wishlists: HashMap<UserId, Vec<ProductId>>,
    orders: HashMap<UserId, Vec<Order>>,
    placed: Vec<NewOrder>,
    withdrawals: Vec<WithdrawalRequest>,
    payment: Option<PaymentInit>,
}

pub struct FakeGateway {
    credential: CredentialSlot,
    state: Mutex<State>,
    calls: Mutex<Vec<Op>>,
    failures: Mutex<HashMap<Op, StatusCode>>,
    gates: Mutex<HashMap<Op, Arc<Semaphore>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

impl FakeGateway {
    pub fn new(credential: CredentialSlot) -> Arc<Self> {
        Arc::new(Self {
            credential,
            state: Mutex::new(State {
                next_user: 1,
                next_order: 1,
                ..Default::default()
            }),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        })
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn add_user(&self, email: &str, password: &str, name: &str, role: Role) -> Identity {
        let mut state = lock(&self.state);
        let id = UserId::new(state.next_user);
        state.next_user += 1;

        let identity = Identity {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            profile_image: None,
            phone: None,
            business_name: None,
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    pub fn token_for(&self, user_id: UserId) -> SecretString {
        SecretString::from(format!("token-{user_id}"))
    }

    pub fn add_product(&self, id: i64, name: &str, price: i64) -> Product {
        let product = Product {
            id: ProductId::new(id),
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            description: None,
            price: Money::from_major(price),
            discount_price: None,
            primary_image: None,
            sku: Some(format!("SKU-{id}")),
            stock: Some(10),
            category_name: None,
            seller_name: None,
        };
        lock(&self.state).catalog.push(product.clone());
        product
    }

    pub fn seed_wishlist(&self, user_id: UserId, product_id: ProductId) {
        lock(&self.state)
            .wishlists
            .entry(user_id)
            .or_default()
            .push(product_id);
    }

    pub fn seed_order(&self, user_id: UserId, total: i64) -> Order {
        let mut state = lock(&self.state);
        let order = new_order_record(&mut state, total);
        state.orders.entry(user_id).or_default().push(order.clone());
        order
    }

    pub fn set_payment(&self, payment: PaymentInit) {
        lock(&self.state).payment = Some(payment);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self) -> Vec<Op> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, op: Op) -> usize {
        lock(&self.calls).iter().filter(|c| **c == op).count()
    }

    pub fn placed_orders(&self) -> Vec<NewOrder> {
        lock(&self.state).placed.clone()
    }

    pub fn withdrawals(&self) -> Vec<WithdrawalRequest> {
        lock(&self.state).withdrawals.clone()
    }

    pub fn remote_wishlist(&self, user_id: UserId) -> Vec<ProductId> {
        lock(&self.state)
            .wishlists
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Make `op` fail with a 500 until [`FakeGateway::recover`].
    pub fn fail(&self, op: Op) {
        self.fail_with(op, StatusCode::INTERNAL_SERVER_ERROR);
    }

    pub fn fail_with(&self, op: Op, status: StatusCode) {
        lock(&self.failures).insert(op, status);
    }

    pub fn recover(&self, op: Op) {
        lock(&self.failures).remove(&op);
    }

    /// Block calls to `op` until [`FakeGateway::release`].
    pub fn hold(&self, op: Op) {
        lock(&self.gates).insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: Op) {
        if let Some(gate) = lock(&self.gates).remove(&op) {
            gate.close();
        }
    }

    /// Yield until `op` has been called at least `count` times.
    pub async fn wait_for_calls(&self, op: Op, count: usize) {
        while self.calls_of(op) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn enter(&self, op: Op) -> GatewayResult<()> {
        lock(&self.calls).push(op);

        let gate = lock(&self.gates).get(&op).cloned();
        if let Some(gate) = gate {
            // A closed semaphore is the release signal
            let _ = gate.acquire().await;
        }

        let failure = lock(&self.failures).get(&op).copied();
        match failure {
            Some(status) => Err(GatewayError::from_status(status, String::new())),
            None => Ok(()),
        }
    }

    fn current_user(&self) -> GatewayResult<UserId> {
        let token = self
            .credential
            .bearer()
            .ok_or(GatewayError::MissingCredential)?;
        let state = lock(&self.state);
        state
            .accounts
            .values()
            .map(|a| a.identity.id)
            .find(|id| self.token_for(*id).expose_secret() == token.expose_secret())
            .ok_or_else(|| GatewayError::Unauthorized("Invalid token".to_string()))
    }

    fn require_seller(&self) -> GatewayResult<UserId> {
        let user_id = self.current_user()?;
        if self.identity_of(user_id).role.can_sell() {
            Ok(user_id)
        } else {
            Err(GatewayError::Unauthorized("Sellers only".to_string()))
        }
    }

    fn identity_of(&self, user_id: UserId) -> Identity {
        lock(&self.state)
            .accounts
            .values()
            .find(|a| a.identity.id == user_id)
            .map(|a| a.identity.clone())
            .unwrap()
    }
}

fn new_order_record(state: &mut State, total: i64) -> Order {
    let id = state.next_order;
    state.next_order += 1;
    Order {
        id: OrderId::new(id),
        order_number: format!("ORD-{id:04}"),
        status: OrderStatus::Pending,
        total: Money::from_major(total),
        items_count: 1,
        payment_method: souk_core::PaymentMethod::Cod,
        city: None,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn register(&self, form: &Registration) -> GatewayResult<AuthPayload> {
        self.enter(Op::Register).await?;
        if lock(&self.state).accounts.contains_key(form.email.trim()) {
            return Err(GatewayError::from_status(
                StatusCode::BAD_REQUEST,
                "Email already registered".to_string(),
            ));
        }

        let mut identity = self.add_user(
            form.email.trim(),
            form.password.expose_secret(),
            &form.name,
            form.role,
        );
        identity.business_name.clone_from(&form.business_name);
        Ok(AuthPayload {
            token: self.token_for(identity.id),
            user: identity,
        })
    }

    async fn login(&self, credentials: &Credentials) -> GatewayResult<AuthPayload> {
        self.enter(Op::Login).await?;
        let identity = {
            let state = lock(&self.state);
            state
                .accounts
                .get(credentials.email.as_str())
                .filter(|a| a.password == credentials.password.expose_secret())
                .map(|a| a.identity.clone())
        };

        identity
            .map(|user| AuthPayload {
                token: self.token_for(user.id),
                user,
            })
            .ok_or_else(|| GatewayError::Unauthorized("Invalid email or password".to_string()))
    }

    async fn profile(&self) -> GatewayResult<Identity> {
        self.enter(Op::Profile).await?;
        let user_id = self.current_user()?;
        Ok(self.identity_of(user_id))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> GatewayResult<Identity> {
        self.enter(Op::UpdateProfile).await?;
        let user_id = self.current_user()?;
        let mut state = lock(&self.state);
        let account = state
            .accounts
            .values_mut()
            .find(|a| a.identity.id == user_id)
            .unwrap();
        if let Some(name) = &update.name {
            account.identity.name.clone_from(name);
        }
        if let Some(phone) = &update.phone {
            account.identity.phone = Some(phone.clone());
        }
        Ok(account.identity.clone())
    }

    async fn wishlist(&self) -> GatewayResult<Vec<WishlistEntry>> {
        self.enter(Op::Wishlist).await?;
        let user_id = self.current_user()?;
        let state = lock(&self.state);
        let ids = state.wishlists.get(&user_id).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| state.catalog.iter().find(|p| p.id == id))
            .map(|p| WishlistEntry {
                product_id: p.id,
                name: p.name.clone(),
                price: p.price,
                discount_price: p.discount_price,
                image: p.primary_image.clone(),
                slug: Some(p.slug.clone()),
            })
            .collect())
    }

    async fn add_to_wishlist(&self, product_id: ProductId) -> GatewayResult<()> {
        self.enter(Op::AddToWishlist).await?;
        let user_id = self.current_user()?;
        let mut state = lock(&self.state);
        let list = state.wishlists.entry(user_id).or_default();
        if !list.contains(&product_id) {
            list.push(product_id);
        }
        Ok(())
    }

    async fn remove_from_wishlist(&self, product_id: ProductId) -> GatewayResult<()> {
        self.enter(Op::RemoveFromWishlist).await?;
        let user_id = self.current_user()?;
        if let Some(list) = lock(&self.state).wishlists.get_mut(&user_id) {
            list.retain(|id| *id != product_id);
        }
        Ok(())
    }

    async fn orders(&self) -> GatewayResult<Vec<Order>> {
        self.enter(Op::Orders).await?;
        let user_id = self.current_user()?;
        Ok(lock(&self.state)
            .orders
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn order(&self, order_id: OrderId) -> GatewayResult<Order> {
        self.enter(Op::Order).await?;
        let user_id = self.current_user()?;
        lock(&self.state)
            .orders
            .get(&user_id)
            .and_then(|orders| orders.iter().find(|o| o.id == order_id).cloned())
            .ok_or_else(|| GatewayError::NotFound("Order not found".to_string()))
    }

    async fn seller_orders(&self) -> GatewayResult<Vec<Order>> {
        self.enter(Op::SellerOrders).await?;
        let user_id = self.current_user()?;
        if !self.identity_of(user_id).role.can_sell() {
            return Err(GatewayError::Unauthorized("Sellers only".to_string()));
        }
        Ok(lock(&self.state)
            .orders
            .values()
            .flatten()
            .cloned()
            .collect())
    }

    async fn create_order(&self, order: &NewOrder) -> GatewayResult<OrderId> {
        self.enter(Op::CreateOrder).await?;
        let user_id = self.current_user()?;
        let mut state = lock(&self.state);
        let mut record = new_order_record(&mut state, 0);
        record.payment_method = order.payment_method;
        record.items_count = order.items.iter().map(|i| i.quantity).sum();
        record.city = Some(order.shipping_address.city.clone());
        let id = record.id;
        state.orders.entry(user_id).or_default().push(record);
        state.placed.push(order.clone());
        Ok(id)
    }

    async fn initialize_payment(&self, order_id: OrderId) -> GatewayResult<PaymentInit> {
        self.enter(Op::InitializePayment).await?;
        self.current_user()?;
        Ok(lock(&self.state).payment.clone().unwrap_or_else(|| PaymentInit {
            success: true,
            checkout_url: Some(format!("https://checkout.chapa.co/pay/{order_id}")),
        }))
    }

    async fn verify_payment(&self, tx_ref: &str) -> GatewayResult<bool> {
        self.enter(Op::VerifyPayment).await?;
        self.current_user()?;
        Ok(tx_ref.starts_with("tx-ok"))
    }

    async fn products(&self, query: &ProductQuery) -> GatewayResult<Vec<Product>> {
        self.enter(Op::Products).await?;
        let search = query.search.as_deref().map(str::to_lowercase);
        Ok(lock(&self.state)
            .catalog
            .iter()
            .filter(|p| {
                search
                    .as_deref()
                    .is_none_or(|s| p.name.to_lowercase().contains(s))
            })
            .cloned()
            .collect())
    }

    async fn product(&self, slug: &str) -> GatewayResult<Product> {
        self.enter(Op::Product).await?;
        lock(&self.state)
            .catalog
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound("Product not found".to_string()))
    }

    async fn categories(&self) -> GatewayResult<Vec<Category>> {
        self.enter(Op::Categories).await?;
        Ok(vec![Category {
            id: souk_core::CategoryId::new(1),
            name: "Coffee".to_string(),
            slug: "coffee".to_string(),
            image: None,
        }])
    }

    async fn create_product(&self, draft: &ProductDraft) -> GatewayResult<()> {
        self.enter(Op::CreateProduct).await?;
        let seller = self.identity_of(self.require_seller()?);
        let mut state = lock(&self.state);
        let id = state.catalog.iter().map(|p| p.id.as_i64()).max().unwrap_or(0) + 1;
        state.catalog.push(Product {
            id: ProductId::new(id),
            name: draft.name.clone(),
            slug: draft.name.to_lowercase().replace(' ', "-"),
            description: draft.description.clone(),
            price: draft.price,
            discount_price: draft.discount_price,
            primary_image: None,
            sku: None,
            stock: Some(draft.stock_quantity),
            category_name: None,
            seller_name: seller.business_name,
        });
        Ok(())
    }

    async fn update_product(&self, product_id: ProductId, draft: &ProductDraft) -> GatewayResult<()> {
        self.enter(Op::UpdateProduct).await?;
        self.require_seller()?;
        let mut state = lock(&self.state);
        let product = state
            .catalog
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| GatewayError::NotFound("Product not found".to_string()))?;
        product.name.clone_from(&draft.name);
        product.description.clone_from(&draft.description);
        product.price = draft.price;
        product.discount_price = draft.discount_price;
        product.stock = Some(draft.stock_quantity);
        Ok(())
    }

    async fn delete_product(&self, product_id: ProductId) -> GatewayResult<()> {
        self.enter(Op::DeleteProduct).await?;
        self.require_seller()?;
        let mut state = lock(&self.state);
        let before = state.catalog.len();
        state.catalog.retain(|p| p.id != product_id);
        if state.catalog.len() == before {
            return Err(GatewayError::NotFound("Product not found".to_string()));
        }
        Ok(())
    }

    async fn wallet(&self) -> GatewayResult<Wallet> {
        self.enter(Op::Wallet).await?;
        self.current_user()?;
        Ok(Wallet {
            balance: Money::from_major(1200),
            pending_balance: Money::from_major(300),
            transactions: Vec::new(),
        })
    }

    async fn withdraw(&self, request: &WithdrawalRequest) -> GatewayResult<()> {
        self.enter(Op::Withdraw).await?;
        self.current_user()?;
        lock(&self.state).withdrawals.push(request.clone());
        Ok(())
    }
}

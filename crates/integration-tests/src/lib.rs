//! Integration tests for the Souk storefront.
//!
//! The tests drive a real [`souk_storefront::Storefront`] over HTTP against
//! [`MockBackend`], an in-process `axum` server that speaks the marketplace
//! REST API: snake_case response bodies, camelCase request bodies, bearer
//! tokens, and `{ "message": ... }` error bodies.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p souk-integration-tests
//! ```
//!
//! No external services are needed; every test binds its own backend on an
//! ephemeral port.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{FromRequest, Multipart, Path as UrlPath, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use souk_core::Role;
use souk_storefront::{ConfigError, StorefrontConfig};

/// Flat shipping fee the backend adds to every order, in birr.
const SHIPPING_FEE: i64 = 50;

// =============================================================================
// Backend state
// =============================================================================

struct User {
    id: i64,
    email: String,
    password: String,
    name: String,
    role: Role,
    phone: Option<String>,
    business_name: Option<String>,
}

struct ProductRow {
    id: i64,
    name: String,
    slug: String,
    price: i64,
    stock: u32,
    seller_id: Option<i64>,
}

struct OrderRow {
    id: i64,
    user_id: i64,
    number: String,
    status: &'static str,
    total: i64,
    items: Vec<(i64, u32)>,
    payment_method: String,
    city: String,
}

/// A registration or profile form as the backend received it.
#[derive(Debug, Clone, Default)]
pub struct RecordedForm {
    /// Whether the body arrived as `multipart/form-data`.
    pub multipart: bool,
    pub fields: BTreeMap<String, String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub image_len: usize,
}

struct Backend {
    users: Vec<User>,
    products: Vec<ProductRow>,
    wishlists: HashMap<i64, Vec<i64>>,
    orders: Vec<OrderRow>,
    placed: Vec<Value>,
    listings: Vec<Value>,
    withdrawals: Vec<Value>,
    forms: Vec<RecordedForm>,
    product_queries: Vec<HashMap<String, String>>,
    failing: HashSet<String>,
    hits: HashMap<String, usize>,
    payments_enabled: bool,
}

impl Backend {
    fn new() -> Self {
        Self {
            users: Vec::new(),
            products: Vec::new(),
            wishlists: HashMap::new(),
            orders: Vec::new(),
            placed: Vec::new(),
            listings: Vec::new(),
            withdrawals: Vec::new(),
            forms: Vec::new(),
            product_queries: Vec::new(),
            failing: HashSet::new(),
            hits: HashMap::new(),
            payments_enabled: true,
        }
    }

    /// Count the hit and fail it when the route is marked as failing.
    fn enter(&mut self, route: &str) -> Result<(), Response> {
        *self.hits.entry(route.to_string()).or_default() += 1;
        if self.failing.contains(route) {
            return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"));
        }
        Ok(())
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<&User, Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "No token provided"))?;

        token
            .strip_prefix("token-")
            .and_then(|id| id.parse::<i64>().ok())
            .and_then(|id| self.users.iter().find(|user| user.id == id))
            .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid token"))
    }

    /// The signed-in seller's id, or 403 for anyone else.
    fn authorize_seller(&self, headers: &HeaderMap) -> Result<i64, Response> {
        let user = self.authorize(headers)?;
        if user.role.can_sell() {
            Ok(user.id)
        } else {
            Err(error(StatusCode::FORBIDDEN, "Access denied"))
        }
    }

    /// Index of a product the seller owns: 404 when missing, 403 when not theirs.
    fn owned_product(&self, raw_id: &str, seller_id: i64) -> Result<usize, Response> {
        let id = raw_id
            .parse::<i64>()
            .map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid product id"))?;
        let index = self
            .products
            .iter()
            .position(|product| product.id == id)
            .ok_or_else(|| error(StatusCode::NOT_FOUND, "Product not found"))?;
        match self.products.get(index) {
            Some(product) if product.seller_id == Some(seller_id) => Ok(index),
            _ => Err(error(StatusCode::FORBIDDEN, "You can only manage your own products")),
        }
    }

    fn product(&self, id: i64) -> Option<&ProductRow> {
        self.products.iter().find(|product| product.id == id)
    }

    fn product_json(&self, product: &ProductRow) -> Value {
        let seller = product
            .seller_id
            .and_then(|id| self.users.iter().find(|user| user.id == id))
            .and_then(|user| user.business_name.clone());
        json!({
            "id": product.id,
            "name": product.name,
            "slug": product.slug,
            "price": birr(product.price),
            "discount_price": null,
            "primary_image": format!("/uploads/{}.jpg", product.slug),
            // Stock arrives as a string, like the SQL driver reports it
            "stock_quantity": product.stock.to_string(),
            "category_name": "Coffee",
            "seller_name": seller,
        })
    }

    fn wishlist_json(&self, user_id: i64) -> Vec<Value> {
        self.wishlists
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.product(*id))
            .map(|product| {
                json!({
                    "id": product.id * 100,
                    "product_id": product.id,
                    "name": product.name,
                    "slug": product.slug,
                    "price": birr(product.price),
                    "discount_price": null,
                    "image": null,
                })
            })
            .collect()
    }
}

type Shared = Arc<Mutex<Backend>>;
type Reply = Result<(StatusCode, Json<Value>), Response>;

fn lock(shared: &Shared) -> MutexGuard<'_, Backend> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn ok(body: Value) -> Reply {
    Ok((StatusCode::OK, Json(body)))
}

fn created(body: Value) -> Reply {
    Ok((StatusCode::CREATED, Json(body)))
}

fn birr(amount: i64) -> String {
    format!("{amount}.00")
}

/// Amounts arrive as decimal strings, or as plain numbers from older clients.
fn amount(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role.as_str(),
        "phone": user.phone,
        "business_name": user.business_name,
        "profile_image": null,
    })
}

fn order_json(order: &OrderRow) -> Value {
    let items: u32 = order.items.iter().map(|(_, quantity)| quantity).sum();
    json!({
        "id": order.id,
        "order_number": order.number,
        "status": order.status,
        "total": birr(order.total),
        // COUNT(*) comes back as a string
        "items_count": items.to_string(),
        "payment_method": order.payment_method,
        "city": order.city,
        "created_at": "2026-03-01T09:30:00Z",
    })
}

// =============================================================================
// Form decoding
// =============================================================================

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

/// Read a form sent either as JSON or as `multipart/form-data`.
async fn read_form(request: Request) -> Result<RecordedForm, Response> {
    if is_multipart(&request) {
        read_multipart(request).await
    } else {
        let Json(body) = Json::<Value>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        let fields = body
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect();
        Ok(RecordedForm {
            fields,
            ..RecordedForm::default()
        })
    }
}

async fn read_multipart(request: Request) -> Result<RecordedForm, Response> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    let mut form = RecordedForm {
        multipart: true,
        ..RecordedForm::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
            form.file_name = file_name;
            form.content_type = content_type;
            form.image_len = bytes.len();
        } else {
            let value = field.text().await.map_err(IntoResponse::into_response)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

// =============================================================================
// Handlers
// =============================================================================

async fn register(State(shared): State<Shared>, request: Request) -> Reply {
    let form = read_form(request).await?;
    let mut backend = lock(&shared);
    backend.enter("POST /auth/register")?;
    backend.forms.push(form.clone());

    let field = |key: &str| form.fields.get(key).cloned().filter(|v| !v.is_empty());
    let (Some(name), Some(email), Some(password)) = (field("name"), field("email"), field("password"))
    else {
        return Err(error(StatusCode::BAD_REQUEST, "Name, email and password are required"));
    };
    if backend.users.iter().any(|user| user.email == email) {
        return Err(error(StatusCode::BAD_REQUEST, "User already exists"));
    }
    let role = field("role")
        .and_then(|role| role.parse().ok())
        .unwrap_or(Role::Customer);

    let id = i64::try_from(backend.users.len()).unwrap_or_default() + 1;
    let user = User {
        id,
        email,
        password,
        name,
        role,
        phone: field("phone"),
        business_name: field("businessName"),
    };
    let body = json!({ "token": format!("token-{id}"), "user": user_json(&user) });
    backend.users.push(user);
    created(body)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(shared): State<Shared>, Json(body): Json<LoginBody>) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /auth/login")?;

    let user = backend
        .users
        .iter()
        .find(|user| user.email == body.email && user.password == body.password)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid email or password"))?;
    ok(json!({ "token": format!("token-{}", user.id), "user": user_json(user) }))
}

async fn profile(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /auth/profile")?;
    let user = backend.authorize(&headers)?;
    ok(json!({ "user": user_json(user) }))
}

async fn update_profile(State(shared): State<Shared>, request: Request) -> Reply {
    let headers = request.headers().clone();
    let form = read_form(request).await?;
    let mut backend = lock(&shared);
    backend.enter("PUT /auth/profile")?;
    let id = backend.authorize(&headers)?.id;
    backend.forms.push(form.clone());

    let user = backend
        .users
        .iter_mut()
        .find(|user| user.id == id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found"))?;
    if let Some(name) = form.fields.get("name") {
        user.name.clone_from(name);
    }
    if let Some(phone) = form.fields.get("phone") {
        user.phone = Some(phone.clone());
    }
    if let Some(business) = form.fields.get("businessName") {
        user.business_name = Some(business.clone());
    }
    ok(json!({ "user": user_json(user) }))
}

async fn wishlist(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /wishlist")?;
    let id = backend.authorize(&headers)?.id;
    ok(json!({ "wishlist": backend.wishlist_json(id) }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WishlistBody {
    product_id: i64,
}

async fn add_to_wishlist(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<WishlistBody>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /wishlist")?;
    let id = backend.authorize(&headers)?.id;
    if backend.product(body.product_id).is_none() {
        return Err(error(StatusCode::NOT_FOUND, "Product not found"));
    }

    let entries = backend.wishlists.entry(id).or_default();
    if !entries.contains(&body.product_id) {
        entries.push(body.product_id);
    }
    created(json!({ "message": "Added to wishlist" }))
}

async fn remove_from_wishlist(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(product_id): UrlPath<i64>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("DELETE /wishlist")?;
    let id = backend.authorize(&headers)?.id;
    if let Some(entries) = backend.wishlists.get_mut(&id) {
        entries.retain(|entry| *entry != product_id);
    }
    ok(json!({ "message": "Removed from wishlist" }))
}

async fn orders(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /orders")?;
    let id = backend.authorize(&headers)?.id;
    let orders: Vec<Value> = backend
        .orders
        .iter()
        .filter(|order| order.user_id == id)
        .rev()
        .map(order_json)
        .collect();
    ok(json!({ "orders": orders }))
}

async fn order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(order_id): UrlPath<i64>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /orders/id")?;
    let user_id = backend.authorize(&headers)?.id;
    let order = backend
        .orders
        .iter()
        .find(|order| order.id == order_id && order.user_id == user_id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Order not found"))?;
    ok(json!({ "order": order_json(order) }))
}

async fn seller_orders(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /orders/seller")?;
    let seller = backend.authorize(&headers)?;
    if !seller.role.can_sell() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied"));
    }
    let seller_id = seller.id;

    let orders: Vec<Value> = backend
        .orders
        .iter()
        .filter(|order| {
            order.items.iter().any(|(product_id, _)| {
                backend
                    .product(*product_id)
                    .is_some_and(|product| product.seller_id == Some(seller_id))
            })
        })
        .map(order_json)
        .collect();
    ok(json!({ "orders": orders }))
}

async fn create_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /orders")?;
    let user_id = backend.authorize(&headers)?.id;

    let mut items = Vec::new();
    let mut total = SHIPPING_FEE;
    for item in body["items"].as_array().into_iter().flatten() {
        let product_id = item["productId"].as_i64().unwrap_or_default();
        let quantity = u32::try_from(item["quantity"].as_u64().unwrap_or_default()).unwrap_or_default();
        let product = backend
            .product(product_id)
            .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Product not found"))?;
        total += product.price * i64::from(quantity);
        items.push((product_id, quantity));
    }
    if items.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Order must contain at least one item"));
    }

    let id = i64::try_from(backend.orders.len()).unwrap_or_default() + 1;
    backend.orders.push(OrderRow {
        id,
        user_id,
        number: format!("SOUK-{id:05}"),
        status: "pending",
        total,
        items,
        payment_method: body["paymentMethod"].as_str().unwrap_or("chapa").to_string(),
        city: body["shippingAddress"]["city"].as_str().unwrap_or_default().to_string(),
    });
    backend.placed.push(body);
    created(json!({ "message": "Order created", "orderId": id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    order_id: i64,
}

async fn initialize_payment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PaymentBody>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /payment/initialize")?;
    let user_id = backend.authorize(&headers)?.id;
    if !backend
        .orders
        .iter()
        .any(|order| order.id == body.order_id && order.user_id == user_id)
    {
        return Err(error(StatusCode::NOT_FOUND, "Order not found"));
    }

    if backend.payments_enabled {
        ok(json!({
            "success": true,
            "checkout_url": format!("https://checkout.chapa.co/checkout/payment/tx-ok-{}", body.order_id),
        }))
    } else {
        ok(json!({ "success": false, "message": "Payment provider unavailable" }))
    }
}

async fn verify_payment(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(tx_ref): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /payment/verify")?;
    backend.authorize(&headers)?;

    let paid = tx_ref
        .strip_prefix("tx-ok-")
        .and_then(|id| id.parse::<i64>().ok());
    if let Some(order) = paid.and_then(|id| backend.orders.iter_mut().find(|order| order.id == id)) {
        order.status = "confirmed";
    }
    ok(json!({ "success": paid.is_some() }))
}

async fn products(
    State(shared): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /products")?;
    let search = query.get("search").map(|s| s.to_lowercase());
    let max_price = query.get("maxPrice").and_then(|p| p.parse::<f64>().ok());

    #[allow(clippy::cast_precision_loss)]
    let products: Vec<Value> = backend
        .products
        .iter()
        .filter(|p| search.as_ref().is_none_or(|s| p.name.to_lowercase().contains(s)))
        .filter(|p| max_price.is_none_or(|max| p.price as f64 <= max))
        .map(|p| backend.product_json(p))
        .collect();
    backend.product_queries.push(query);
    ok(json!({ "products": products }))
}

async fn product(State(shared): State<Shared>, UrlPath(slug): UrlPath<String>) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /products/slug")?;
    let product = backend
        .products
        .iter()
        .find(|product| product.slug == slug)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Product not found"))?;
    ok(json!({ "product": backend.product_json(product) }))
}

/// Name, whole-birr price and stock from a listing body.
fn listing_fields(body: &Value) -> Result<(String, i64, u32), Response> {
    let name = body["name"].as_str().unwrap_or_default().trim().to_string();
    let price = amount(&body["price"]).filter(|price| *price > 0.0);
    let Some(price) = price.filter(|_| !name.is_empty()) else {
        return Err(error(StatusCode::BAD_REQUEST, "Name and price are required"));
    };
    let stock = u32::try_from(body["stockQuantity"].as_u64().unwrap_or_default()).unwrap_or_default();

    #[allow(clippy::cast_possible_truncation)]
    let price = price.round() as i64;
    Ok((name, price, stock))
}

async fn create_listing(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /products")?;
    let seller_id = backend.authorize_seller(&headers)?;
    let (name, price, stock) = listing_fields(&body)?;

    let id = backend.products.iter().map(|p| p.id).max().unwrap_or_default() + 1;
    let slug = name.to_lowercase().replace(' ', "-");
    backend.products.push(ProductRow {
        id,
        name,
        slug,
        price,
        stock,
        seller_id: Some(seller_id),
    });
    backend.listings.push(body);
    let product = backend.product(id).map(|p| backend.product_json(p));
    created(json!({ "message": "Product created", "product": product }))
}

async fn update_listing(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(product_id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("PUT /products/id")?;
    let seller_id = backend.authorize_seller(&headers)?;
    let index = backend.owned_product(&product_id, seller_id)?;
    let (name, price, stock) = listing_fields(&body)?;

    if let Some(product) = backend.products.get_mut(index) {
        product.name = name;
        product.price = price;
        product.stock = stock;
    }
    backend.listings.push(body);
    ok(json!({ "message": "Product updated" }))
}

async fn delete_listing(
    State(shared): State<Shared>,
    headers: HeaderMap,
    UrlPath(product_id): UrlPath<String>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("DELETE /products/id")?;
    let seller_id = backend.authorize_seller(&headers)?;
    let index = backend.owned_product(&product_id, seller_id)?;
    backend.products.remove(index);
    ok(json!({ "message": "Product deleted" }))
}

async fn categories(State(shared): State<Shared>) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /categories")?;
    ok(json!({
        "categories": [
            { "id": 1, "name": "Coffee", "slug": "coffee" },
            { "id": 2, "name": "Spices", "slug": "spices", "image": "/uploads/spices.jpg" },
        ]
    }))
}

async fn wallet(State(shared): State<Shared>, headers: HeaderMap) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("GET /wallet")?;
    if !backend.authorize(&headers)?.role.can_sell() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied"));
    }
    ok(json!({
        "balance": "1200.00",
        "pending_balance": "300.00",
        "transactions": [
            {
                "id": 1,
                "type": "sale",
                "amount": "450.00",
                "status": "completed",
                "description": "Order SOUK-00001",
                "created_at": "2026-02-14T12:00:00Z",
            },
            { "id": 2, "type": "withdrawal", "amount": "200.00", "status": "pending" },
        ]
    }))
}

async fn withdraw(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut backend = lock(&shared);
    backend.enter("POST /wallet/withdraw")?;
    if !backend.authorize(&headers)?.role.can_sell() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied"));
    }
    if amount(&body["amount"]).is_none_or(|amount| amount > 1200.0) {
        return Err(error(StatusCode::BAD_REQUEST, "Insufficient balance"));
    }
    backend.withdrawals.push(body);
    created(json!({ "message": "Withdrawal request submitted" }))
}

fn router(shared: Shared) -> Router {
    let api = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/profile", get(profile).put(update_profile))
        .route("/wishlist", get(wishlist).post(add_to_wishlist))
        .route("/wishlist/{product_id}", delete(remove_from_wishlist))
        .route("/orders", get(orders).post(create_order))
        .route("/orders/seller", get(seller_orders))
        .route("/orders/{order_id}", get(order))
        .route("/payment/initialize", post(initialize_payment))
        .route("/payment/verify/{tx_ref}", get(verify_payment))
        .route("/products", get(products).post(create_listing))
        // One path for both: reads take a slug, edits take a numeric id
        .route(
            "/products/{slug}",
            get(product).put(update_listing).delete(delete_listing),
        )
        .route("/categories", get(categories))
        .route("/wallet", get(wallet))
        .route("/wallet/withdraw", post(withdraw));

    Router::new().nest("/api", api).with_state(shared)
}

// =============================================================================
// MockBackend
// =============================================================================

/// In-process marketplace backend bound to `127.0.0.1` on an ephemeral port.
///
/// Routes are identified by method and path template without parameters,
/// e.g. `"DELETE /wishlist"` or `"GET /products/slug"`.
pub struct MockBackend {
    addr: SocketAddr,
    shared: Shared,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Mutex::new(Backend::new()));

        let app = router(Arc::clone(&shared));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            shared,
            server,
        })
    }

    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Storefront configuration pointing at this backend. The token is kept
    /// in memory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the generated configuration does not parse.
    pub fn config(&self) -> Result<StorefrontConfig, ConfigError> {
        self.config_with(None)
    }

    /// Like [`MockBackend::config`], persisting the token to `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the generated configuration does not parse.
    pub fn config_with_token_file(&self, path: &Path) -> Result<StorefrontConfig, ConfigError> {
        self.config_with(Some(path.display().to_string()))
    }

    fn config_with(&self, token_path: Option<String>) -> Result<StorefrontConfig, ConfigError> {
        let api_url = self.api_url();
        StorefrontConfig::from_lookup(|key| match key {
            "SOUK_API_URL" => Some(api_url.clone()),
            "SOUK_HTTP_TIMEOUT_SECS" => Some("5".to_string()),
            // Long enough that nothing expires mid-test
            "SOUK_NOTIFICATION_MS" => Some("60000".to_string()),
            "SOUK_TOKEN_PATH" => token_path.clone(),
            _ => None,
        })
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Create an account and return its id.
    pub fn add_user(&self, email: &str, password: &str, name: &str, role: Role) -> i64 {
        let mut backend = lock(&self.shared);
        let id = i64::try_from(backend.users.len()).unwrap_or_default() + 1;
        backend.users.push(User {
            id,
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            role,
            phone: None,
            business_name: role.can_sell().then(|| format!("{name} Trading")),
        });
        id
    }

    /// Add a product priced in whole birr and return its slug.
    pub fn add_product(&self, id: i64, name: &str, price: i64) -> String {
        let slug = name.to_lowercase().replace(' ', "-");
        lock(&self.shared).products.push(ProductRow {
            id,
            name: name.to_string(),
            slug: slug.clone(),
            price,
            stock: 12,
            seller_id: None,
        });
        slug
    }

    pub fn assign_seller(&self, product_id: i64, seller_id: i64) {
        let mut backend = lock(&self.shared);
        if let Some(product) = backend.products.iter_mut().find(|p| p.id == product_id) {
            product.seller_id = Some(seller_id);
        }
    }

    pub fn seed_wishlist(&self, user_id: i64, product_id: i64) {
        lock(&self.shared)
            .wishlists
            .entry(user_id)
            .or_default()
            .push(product_id);
    }

    #[must_use]
    pub fn token_for(&self, user_id: i64) -> String {
        format!("token-{user_id}")
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Answer every request to `route` with a 500 until [`MockBackend::recover`].
    pub fn fail(&self, route: &str) {
        lock(&self.shared).failing.insert(route.to_string());
    }

    pub fn recover(&self, route: &str) {
        lock(&self.shared).failing.remove(route);
    }

    /// Make payment initialization report `success: false`.
    pub fn disable_payments(&self) {
        lock(&self.shared).payments_enabled = false;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[must_use]
    pub fn hits(&self, route: &str) -> usize {
        lock(&self.shared).hits.get(route).copied().unwrap_or_default()
    }

    /// Registration and profile forms in arrival order.
    #[must_use]
    pub fn forms(&self) -> Vec<RecordedForm> {
        lock(&self.shared).forms.clone()
    }

    /// Raw order-creation bodies in arrival order.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<Value> {
        lock(&self.shared).placed.clone()
    }

    /// Raw product create and update bodies in arrival order.
    #[must_use]
    pub fn listings(&self) -> Vec<Value> {
        lock(&self.shared).listings.clone()
    }

    #[must_use]
    pub fn withdrawals(&self) -> Vec<Value> {
        lock(&self.shared).withdrawals.clone()
    }

    #[must_use]
    pub fn product_queries(&self) -> Vec<HashMap<String, String>> {
        lock(&self.shared).product_queries.clone()
    }

    #[must_use]
    pub fn remote_wishlist(&self, user_id: i64) -> Vec<i64> {
        lock(&self.shared)
            .wishlists
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn order_status(&self, order_id: i64) -> Option<&'static str> {
        lock(&self.shared)
            .orders
            .iter()
            .find(|order| order.id == order_id)
            .map(|order| order.status)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

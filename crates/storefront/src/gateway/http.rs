//! REST implementation of [`Gateway`] over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, instrument};
use url::Url;

use souk_core::{OrderId, ProductId};

use super::cache::{CacheKey, CacheValue};
use super::types::{
    AuthPayload, Category, Credentials, Identity, NewOrder, Order, PaymentInit, Product,
    ProductDraft, ProductQuery, ProfileImage, ProfileUpdate, Registration, Wallet, WishlistEntry,
    WithdrawalRequest,
};
use super::{Gateway, GatewayError, GatewayResult};
use crate::config::StorefrontConfig;
use crate::credential::CredentialSlot;

// =============================================================================
// Response envelopes
// =============================================================================

#[derive(Deserialize)]
struct AuthEnvelope {
    token: String,
    user: Identity,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: Identity,
}

#[derive(Deserialize)]
struct WishlistEnvelope {
    #[serde(default)]
    wishlist: Vec<WishlistEntry>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Vec<Order>,
}

#[derive(Deserialize)]
struct OrderEnvelope {
    order: Order,
}

#[derive(Deserialize)]
struct OrderCreatedEnvelope {
    #[serde(rename = "orderId", alias = "order_id")]
    order_id: OrderId,
}

#[derive(Deserialize)]
struct VerifyEnvelope {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: Product,
}

#[derive(Deserialize)]
struct CategoriesEnvelope {
    #[serde(default)]
    categories: Vec<Category>,
}

/// Error bodies carry `{ "message": "..." }`; some routes use `error`.
#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Whether a request must carry the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Token attached when held.
    Public,
    /// Fails with `MissingCredential` when no token is held.
    Private,
}

// =============================================================================
// HttpGateway
// =============================================================================

/// Client for the marketplace REST API.
///
/// Product details and categories are cached for 5 minutes.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<HttpGatewayInner>,
}

struct HttpGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    credential: CredentialSlot,
    cache: Cache<CacheKey, CacheValue>,
}

impl HttpGateway {
    /// Create a gateway with the configured base URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &StorefrontConfig, credential: CredentialSlot) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone(), credential))
    }

    /// Create a gateway around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: Url, credential: CredentialSlot) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(HttpGatewayInner {
                client,
                base_url,
                credential,
                cache,
            }),
        }
    }

    /// Drop every cached catalog response.
    pub fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
    }

    /// Evict every cached copy of a product. Entries are keyed by slug, so
    /// they are matched on the cached product's id.
    async fn forget_product(&self, product_id: ProductId) {
        let stale: Vec<_> = self
            .inner
            .cache
            .iter()
            .filter(|(_, value)| {
                matches!(value, CacheValue::Product(product) if product.id == product_id)
            })
            .map(|(key, _)| key)
            .collect();

        for key in stale {
            self.inner.cache.invalidate(key.as_ref()).await;
        }
        debug!(product_id = %product_id, "Evicted cached product");
    }

    /// Build an endpoint URL below the base, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                GatewayError::InvalidRequest(format!(
                    "{} cannot be used as a base URL",
                    self.inner.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, access: Access) -> GatewayResult<reqwest::RequestBuilder> {
        let builder = self.inner.client.request(method, url);
        match (self.inner.credential.bearer(), access) {
            (Some(token), _) => Ok(builder.bearer_auth(token.expose_secret())),
            (None, Access::Public) => Ok(builder),
            (None, Access::Private) => Err(GatewayError::MissingCredential),
        }
    }

    /// Send a request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> GatewayResult<T> {
        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            let body: ErrorBody = serde_json::from_str(&response_text).unwrap_or_default();
            let message = body.message.or(body.error).unwrap_or_default();
            if status.is_server_error() {
                tracing::error!(
                    status = %status,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Backend returned server error"
                );
            } else {
                debug!(status = %status, message = %message, "Backend rejected request");
            }
            return Err(GatewayError::from_status(status, message));
        }

        // Endpoints that return no content decode as `null`
        let body = if response_text.trim().is_empty() {
            "null"
        } else {
            response_text.as_str()
        };

        serde_json::from_str(body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            GatewayError::Parse(e)
        })
    }
}

// =============================================================================
// Form encoding
// =============================================================================

fn registration_fields(form: &Registration) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("name", form.name.trim().to_string()),
        ("email", form.email.trim().to_string()),
        ("password", form.password.expose_secret().to_string()),
        ("role", form.role.as_str().to_string()),
    ];
    if let Some(phone) = form.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        fields.push(("phone", phone.trim().to_string()));
    }
    if let Some(business) = form.business_name.as_deref().filter(|b| !b.trim().is_empty()) {
        fields.push(("businessName", business.trim().to_string()));
    }
    fields
}

fn profile_fields(update: &ProfileUpdate) -> Vec<(&'static str, String)> {
    [
        ("name", &update.name),
        ("phone", &update.phone),
        ("businessName", &update.business_name),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.as_ref().map(|v| (key, v.trim().to_string())))
    .collect()
}

fn json_object(fields: Vec<(&'static str, String)>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect(),
    )
}

fn multipart(fields: Vec<(&'static str, String)>, image: &ProfileImage) -> GatewayResult<Form> {
    let form = fields
        .into_iter()
        .fold(Form::new(), |form, (key, value)| form.text(key, value));

    let part = Part::bytes(image.bytes.clone())
        .file_name(image.file_name.clone())
        .mime_str(&image.mime_type)?;

    Ok(form.part("profileImage", part))
}

fn auth_payload(envelope: AuthEnvelope) -> AuthPayload {
    AuthPayload {
        token: SecretString::from(envelope.token),
        user: envelope.user,
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    // =========================================================================
    // Auth
    // =========================================================================

    #[instrument(skip(self, form), fields(email = %form.email, with_image = form.profile_image.is_some()))]
    async fn register(&self, form: &Registration) -> GatewayResult<AuthPayload> {
        let url = self.endpoint(&["auth", "register"])?;
        let request = self.request(Method::POST, url, Access::Public)?;
        let fields = registration_fields(form);

        let request = match &form.profile_image {
            Some(image) => request.multipart(multipart(fields, image)?),
            None => request.json(&json_object(fields)),
        };

        self.execute::<AuthEnvelope>(request).await.map(auth_payload)
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> GatewayResult<AuthPayload> {
        let url = self.endpoint(&["auth", "login"])?;
        let body = serde_json::json!({
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
        });
        let request = self.request(Method::POST, url, Access::Public)?.json(&body);

        self.execute::<AuthEnvelope>(request).await.map(auth_payload)
    }

    #[instrument(skip(self))]
    async fn profile(&self) -> GatewayResult<Identity> {
        let url = self.endpoint(&["auth", "profile"])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<UserEnvelope>(request).await?.user)
    }

    #[instrument(skip(self, update))]
    async fn update_profile(&self, update: &ProfileUpdate) -> GatewayResult<Identity> {
        let url = self.endpoint(&["auth", "profile"])?;
        let request = self.request(Method::PUT, url, Access::Private)?;
        let fields = profile_fields(update);

        let request = match &update.profile_image {
            Some(image) => request.multipart(multipart(fields, image)?),
            None => request.json(&json_object(fields)),
        };

        Ok(self.execute::<UserEnvelope>(request).await?.user)
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    #[instrument(skip(self))]
    async fn wishlist(&self) -> GatewayResult<Vec<WishlistEntry>> {
        let url = self.endpoint(&["wishlist"])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<WishlistEnvelope>(request).await?.wishlist)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_to_wishlist(&self, product_id: ProductId) -> GatewayResult<()> {
        let url = self.endpoint(&["wishlist"])?;
        let request = self
            .request(Method::POST, url, Access::Private)?
            .json(&serde_json::json!({ "productId": product_id }));
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_from_wishlist(&self, product_id: ProductId) -> GatewayResult<()> {
        let id = product_id.to_string();
        let url = self.endpoint(&["wishlist", &id])?;
        let request = self.request(Method::DELETE, url, Access::Private)?;
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    // =========================================================================
    // Orders & payments
    // =========================================================================

    #[instrument(skip(self))]
    async fn orders(&self) -> GatewayResult<Vec<Order>> {
        let url = self.endpoint(&["orders"])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<OrdersEnvelope>(request).await?.orders)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn order(&self, order_id: OrderId) -> GatewayResult<Order> {
        let id = order_id.to_string();
        let url = self.endpoint(&["orders", &id])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<OrderEnvelope>(request).await?.order)
    }

    #[instrument(skip(self))]
    async fn seller_orders(&self) -> GatewayResult<Vec<Order>> {
        let url = self.endpoint(&["orders", "seller"])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<OrdersEnvelope>(request).await?.orders)
    }

    #[instrument(skip(self, order), fields(items = order.items.len(), payment_method = %order.payment_method))]
    async fn create_order(&self, order: &NewOrder) -> GatewayResult<OrderId> {
        let url = self.endpoint(&["orders"])?;
        let request = self.request(Method::POST, url, Access::Private)?.json(order);
        Ok(self.execute::<OrderCreatedEnvelope>(request).await?.order_id)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn initialize_payment(&self, order_id: OrderId) -> GatewayResult<PaymentInit> {
        let url = self.endpoint(&["payment", "initialize"])?;
        let request = self
            .request(Method::POST, url, Access::Private)?
            .json(&serde_json::json!({ "orderId": order_id }));
        self.execute::<PaymentInit>(request).await
    }

    #[instrument(skip(self))]
    async fn verify_payment(&self, tx_ref: &str) -> GatewayResult<bool> {
        let url = self.endpoint(&["payment", "verify", tx_ref])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        Ok(self.execute::<VerifyEnvelope>(request).await?.success)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    #[instrument(skip(self))]
    async fn products(&self, query: &ProductQuery) -> GatewayResult<Vec<Product>> {
        let mut url = self.endpoint(&["products"])?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let request = self.request(Method::GET, url, Access::Public)?;
        Ok(self.execute::<ProductsEnvelope>(request).await?.products)
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn product(&self, slug: &str) -> GatewayResult<Product> {
        let cache_key = CacheKey::Product(slug.to_string());

        // Check cache
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let url = self.endpoint(&["products", slug])?;
        let request = self.request(Method::GET, url, Access::Public)?;
        let product = self.execute::<ProductEnvelope>(request).await?.product;

        // Cache the result
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    #[instrument(skip(self))]
    async fn categories(&self) -> GatewayResult<Vec<Category>> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let url = self.endpoint(&["categories"])?;
        let request = self.request(Method::GET, url, Access::Public)?;
        let categories = self.execute::<CategoriesEnvelope>(request).await?.categories;

        self.inner
            .cache
            .insert(CacheKey::Categories, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    // =========================================================================
    // Seller catalog
    // =========================================================================

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create_product(&self, draft: &ProductDraft) -> GatewayResult<()> {
        let url = self.endpoint(&["products"])?;
        let request = self.request(Method::POST, url, Access::Private)?.json(draft);
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }

    #[instrument(skip(self, draft), fields(product_id = %product_id))]
    async fn update_product(&self, product_id: ProductId, draft: &ProductDraft) -> GatewayResult<()> {
        let id = product_id.to_string();
        let url = self.endpoint(&["products", &id])?;
        let request = self.request(Method::PUT, url, Access::Private)?.json(draft);
        self.execute::<IgnoredAny>(request).await?;
        self.forget_product(product_id).await;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn delete_product(&self, product_id: ProductId) -> GatewayResult<()> {
        let id = product_id.to_string();
        let url = self.endpoint(&["products", &id])?;
        let request = self.request(Method::DELETE, url, Access::Private)?;
        self.execute::<IgnoredAny>(request).await?;
        self.forget_product(product_id).await;
        Ok(())
    }

    // =========================================================================
    // Seller wallet
    // =========================================================================

    #[instrument(skip(self))]
    async fn wallet(&self) -> GatewayResult<Wallet> {
        let url = self.endpoint(&["wallet"])?;
        let request = self.request(Method::GET, url, Access::Private)?;
        self.execute::<Wallet>(request).await
    }

    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn withdraw(&self, request: &WithdrawalRequest) -> GatewayResult<()> {
        let url = self.endpoint(&["wallet", "withdraw"])?;
        let request = self.request(Method::POST, url, Access::Private)?.json(request);
        self.execute::<IgnoredAny>(request).await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use souk_core::Role;

    use super::*;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::with_client(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            CredentialSlot::new(),
        )
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let gateway = gateway("http://localhost:4000/api/");
        assert_eq!(
            gateway.endpoint(&["wishlist", "7"]).unwrap().as_str(),
            "http://localhost:4000/api/wishlist/7"
        );
        assert_eq!(
            gateway.endpoint(&["products", "shay/bunna"]).unwrap().path(),
            "/api/products/shay%2Fbunna"
        );
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let gateway = gateway("http://localhost:4000/api");
        assert_eq!(
            gateway.endpoint(&["auth", "login"]).unwrap().path(),
            "/api/auth/login"
        );
    }

    #[test]
    fn test_private_request_requires_token() {
        let gateway = gateway("http://localhost:4000/api/");
        let url = gateway.endpoint(&["orders"]).unwrap();
        assert!(matches!(
            gateway.request(Method::GET, url.clone(), Access::Private),
            Err(GatewayError::MissingCredential)
        ));
        assert!(gateway.request(Method::GET, url, Access::Public).is_ok());
    }

    #[test]
    fn test_registration_fields_skip_blank_optionals() {
        let form = Registration {
            name: " Almaz ".to_string(),
            email: "almaz@example.com".to_string(),
            phone: Some("  ".to_string()),
            password: SecretString::from("pw"),
            confirm_password: SecretString::from("pw"),
            role: Role::Seller,
            business_name: Some("Almaz Spices".to_string()),
            profile_image: None,
        };

        let value = json_object(registration_fields(&form));
        assert_eq!(value["name"], "Almaz");
        assert_eq!(value["role"], "seller");
        assert_eq!(value["businessName"], "Almaz Spices");
        assert!(value.get("phone").is_none());
        assert!(value.get("confirmPassword").is_none());
    }

    #[test]
    fn test_profile_fields_only_include_changes() {
        let update = ProfileUpdate {
            phone: Some("+251900000000".to_string()),
            ..Default::default()
        };
        assert_eq!(
            profile_fields(&update),
            vec![("phone", "+251900000000".to_string())]
        );
    }

    #[test]
    fn test_order_created_envelope_accepts_both_spellings() {
        let a: OrderCreatedEnvelope = serde_json::from_str(r#"{"orderId": 12}"#).unwrap();
        let b: OrderCreatedEnvelope = serde_json::from_str(r#"{"order_id": 12}"#).unwrap();
        assert_eq!(a.order_id, b.order_id);
    }
}

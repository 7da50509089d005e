//! Domain types exchanged with the marketplace backend.
//!
//! Response bodies use snake_case field names; request bodies use camelCase,
//! matching what the backend accepts.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use souk_core::{
    CategoryId, Email, Money, OrderId, OrderStatus, PaymentMethod, ProductId, Role, TransactionId,
    UserId,
};

use crate::error::{ValidationError, require};

// =============================================================================
// Identity
// =============================================================================

/// The signed-in user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, alias = "profileImage")]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "businessName")]
    pub business_name: Option<String>,
}

/// Token and identity returned by login and registration.
#[derive(Debug, Clone)]
pub struct AuthPayload {
    pub token: SecretString,
    pub user: Identity,
}

/// Login form input.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl Credentials {
    /// Validate raw form input.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a malformed email or empty password.
    pub fn parse(email: &str, password: &str) -> Result<Self, ValidationError> {
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        Ok(Self {
            email,
            password: SecretString::from(password.to_string()),
        })
    }
}

/// An image attached to a registration or profile update.
#[derive(Clone)]
pub struct ProfileImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ProfileImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ProfileImage {
    /// Build an image attachment, rejecting non-image content types.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnsupportedImage` unless the MIME type is `image/*`.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, ValidationError> {
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(ValidationError::UnsupportedImage(mime_type));
        }
        Ok(Self {
            file_name: file_name.into(),
            mime_type,
            bytes,
        })
    }
}

/// Registration form input.
///
/// Sent as JSON, or as a multipart form when a profile image is attached.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub role: Role,
    pub business_name: Option<String>,
    pub profile_image: Option<ProfileImage>,
}

impl Registration {
    /// Check the form before it is sent.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<Email, ValidationError> {
        use secrecy::ExposeSecret;

        require(&self.name, "Name")?;
        let email = Email::parse(&self.email)?;
        if self.password.expose_secret().is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        if self.password.expose_secret() != self.confirm_password.expose_secret() {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.role == Role::Seller {
            require(self.business_name.as_deref().unwrap_or_default(), "Business name")?;
        }
        Ok(email)
    }
}

/// Editable profile fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub business_name: Option<String>,
    pub profile_image: Option<ProfileImage>,
}

// =============================================================================
// Catalog
// =============================================================================

/// A product as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub discount_price: Option<Money>,
    #[serde(default)]
    pub primary_image: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default, alias = "stock_quantity", deserialize_with = "lenient_opt_u32")]
    pub stock: Option<u32>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub seller_name: Option<String>,
}

impl Product {
    /// The price the buyer pays: the discount price when one is set.
    #[must_use]
    pub fn effective_price(&self) -> Money {
        self.discount_price.unwrap_or(self.price)
    }
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Catalog listing filters.
///
/// Empty or absent filters are dropped from the query string so the backend
/// only sees what was actually requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    /// Query-string pairs with blank values removed.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let text = |key: &'static str, value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v.to_string()))
        };

        [
            text("search", &self.search),
            text("category", &self.category),
            self.min_price.map(|p| ("minPrice", p.amount().to_string())),
            self.max_price.map(|p| ("maxPrice", p.amount().to_string())),
            text("sort", &self.sort),
            self.page.map(|p| ("page", p.to_string())),
            self.limit.map(|l| ("limit", l.to_string())),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// A seller's product form, sent whole on both create and update.
///
/// `weight` and `dimensions` are free text with their unit, e.g. `"2 kg"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category_id: CategoryId,
    pub price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<Money>,
    pub stock_quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
}

impl ProductDraft {
    /// # Errors
    ///
    /// Returns `MissingField` for a blank name, `NonPositiveAmount` for a
    /// price of zero or less, and `DiscountNotBelowPrice` when the discount
    /// would not lower the price.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "Product name")?;
        if !self.price.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        match self.discount_price {
            Some(discount) if !discount.is_positive() || discount >= self.price => {
                Err(ValidationError::DiscountNotBelowPrice)
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Wishlist
// =============================================================================

/// One saved product in the user's wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub discount_price: Option<Money>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

// =============================================================================
// Orders & Payments
// =============================================================================

/// Read-only order summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total: Money,
    #[serde(deserialize_with = "lenient_u32")]
    pub items_count: u32,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where an order is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl ShippingAddress {
    /// Check the required fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for the first blank required field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.full_name, "Full name")?;
        require(&self.phone, "Phone number")?;
        require(&self.address_line, "Address")?;
        require(&self.city, "City")
    }
}

/// One product/quantity pair in an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Order-creation request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemInput>,
}

/// Result of asking the backend to start a hosted payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentInit {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub checkout_url: Option<String>,
}

// =============================================================================
// Wallet
// =============================================================================

/// Seller wallet balances and history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Wallet {
    #[serde(default)]
    pub balance: Money,
    #[serde(default)]
    pub pending_balance: Money,
    #[serde(default)]
    pub transactions: Vec<WalletTransaction>,
}

/// One wallet ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Money,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payout request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub amount: Money,
    pub bank_name: String,
    pub account_number: String,
}

impl WithdrawalRequest {
    /// Check the request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a non-positive amount or blank bank details.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        require(&self.bank_name, "Bank name")?;
        require(&self.account_number, "Account number")
    }
}

// =============================================================================
// Lenient number decoding
// =============================================================================

/// The backend reports SQL `COUNT(*)` results as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u32),
    String(String),
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

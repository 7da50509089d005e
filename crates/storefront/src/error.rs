//! Error taxonomy shared by every state container, plus Sentry helpers.
//!
//! Each module owns its own `thiserror` enum; all of them classify into one
//! of three [`ErrorKind`]s so the view layer can decide where a failure is
//! shown: inline on the form (auth, validation) or as a banner (network).

use thiserror::Error;

use souk_core::EmailError;

/// The three user-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials rejected or expired. Shown on the login form, never retried.
    Auth,
    /// The request could not complete. Shown as an error notification.
    Network,
    /// Input rejected before any request was sent. Shown next to the input.
    Validation,
}

/// Input problems caught before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password is required")]
    EmptyPassword,

    #[error("Invalid email address: {0}")]
    InvalidEmail(#[from] EmailError),

    /// A required form field was left blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Discount price must be below the regular price")]
    DiscountNotBelowPrice,

    #[error("Profile image must be an image file (got {0})")]
    UnsupportedImage(String),
}

/// Require a non-blank form field.
pub(crate) fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Attach the signed-in user to subsequent Sentry events.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Detach the user from Sentry events once nobody is signed in.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Record a storefront action (sign-in, wishlist edit, order) as a Sentry
/// breadcrumb.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("wishlist", "Removed product", Some(&[("product_id", "7")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

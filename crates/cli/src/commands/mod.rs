//! Command implementations. Results are reported through `tracing`.

pub mod auth;
pub mod seller;
pub mod shop;

use std::path::PathBuf;

use souk_storefront::{CheckoutError, GatewayError, SellerError, SessionError, ValidationError};
use thiserror::Error;

/// Errors that end a command with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}", .0.user_message())]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Seller(#[from] SellerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not signed in. Run `souk login` first")]
    NotSignedIn,

    #[error("Invalid item '{0}'. Expected slug=quantity")]
    InvalidItem(String),

    #[error("{0}")]
    Incomplete(&'static str),
}

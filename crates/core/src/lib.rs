//! Souk Core - shared domain types.
//!
//! This crate provides the types every Souk component speaks:
//! - `storefront` - client-side state containers and the backend gateway
//! - `cli` - the command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, emails, and the status/role enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

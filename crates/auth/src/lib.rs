//! `subscriptions-auth` — stateless capability tokens and password hashing.
//!
//! This crate is intentionally decoupled from HTTP and storage: it signs,
//! verifies and hashes strings, nothing more.

pub mod password;
pub mod signer;

pub use password::{PasswordError, PasswordHasher};
pub use signer::{SigningKey, TokenError, TokenPolicy, TokenSigner, issued_at};

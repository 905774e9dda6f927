//! `subscriptions-core` — domain primitives shared by every other crate.
//!
//! This crate contains **pure domain** types (no IO, no async).

pub mod error;
pub mod id;
pub mod model;

pub use error::{DomainError, DomainResult};
pub use id::{PlanId, UserId};
pub use model::{NewUser, Plan, User};

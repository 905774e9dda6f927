//! `subscriptions-app` — workflows and the composition root.
//!
//! Request handling is out of scope; the services here are what a handler
//! would call. They return synchronously and push slow work (mail, manual
//! generation) onto the background coordinator.

pub mod accounts;
pub mod background;
pub mod config;
pub mod render;
pub mod runtime;
pub mod store;
pub mod subscriptions;

pub use accounts::{AccountError, AccountService};
pub use background::Background;
pub use config::{AppConfig, ConfigError};
pub use render::{ManualRenderer, TextManualRenderer};
pub use runtime::{Collaborators, Runtime, Services};
pub use store::{InMemoryPlanStore, InMemoryUserStore, PlanStore, UserStore};
pub use subscriptions::{SubscriptionError, SubscriptionService};

//! Account and plan records consumed by the background workflows.
//!
//! These are plain data carriers; persistence lives behind the store traits in
//! `subscriptions-app`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{PlanId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

/// A subscription plan a user can sign up for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    /// Price in cents.
    pub amount_cents: u64,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(name: impl Into<String>, amount_cents: u64) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            amount_cents,
            created_at: Utc::now(),
        }
    }

    /// Price formatted for invoices, e.g. `$10.00`.
    pub fn amount_for_display(&self) -> String {
        format!("${}.{:02}", self.amount_cents / 100, self.amount_cents % 100)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A registered account.
///
/// # Invariants
/// - `email` is non-empty and unique across users (enforced by the store).
/// - New accounts start inactive; activation happens through a signed link.
/// - `password_hash` is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// bcrypt hash in modular crypt format.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub active: bool,
    pub is_admin: bool,
    pub plan: Option<Plan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn activate(&mut self, at: DateTime<Utc>) {
        self.active = true;
        self.updated_at = at;
    }
}

/// Registration input. Carries the plain-text password until it is hashed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("email must be a valid address"));
        }
        if self.password.is_empty() {
            return Err(DomainError::validation("password must not be empty"));
        }
        Ok(())
    }

    /// Validate the input and build an inactive, non-admin account that
    /// stores `password_hash` in place of the plain-text password.
    pub fn into_user(self, password_hash: String, now: DateTime<Utc>) -> DomainResult<User> {
        self.validate()?;

        Ok(User {
            id: UserId::new(),
            email: self.email.trim().to_string(),
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash,
            active: false,
            is_admin: false,
            plan: None,
            created_at: now,
            updated_at: now,
        })
    }
}

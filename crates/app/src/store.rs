//! Persistence seams for users and plans.
//!
//! The schema is out of scope; workflows only see these traits. The in-memory
//! implementations back development runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use subscriptions_core::{DomainError, DomainResult, Plan, PlanId, User, UserId};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` if the email is taken.
    async fn insert(&self, user: User) -> DomainResult<()>;
    async fn get(&self, id: UserId) -> DomainResult<User>;
    async fn get_by_email(&self, email: &str) -> DomainResult<User>;
    /// Replace an existing user.
    async fn update(&self, user: User) -> DomainResult<()>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get(&self, id: PlanId) -> DomainResult<Plan>;
    async fn list(&self) -> DomainResult<Vec<Plan>>;
    /// Record that `user` is subscribed to `plan`, replacing any earlier plan.
    async fn subscribe_user(&self, user: UserId, plan: PlanId) -> DomainResult<()>;
    async fn subscription(&self, user: UserId) -> DomainResult<Option<PlanId>>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn insert(&self, user: User) -> DomainResult<()> {
        (**self).insert(user).await
    }

    async fn get(&self, id: UserId) -> DomainResult<User> {
        (**self).get(id).await
    }

    async fn get_by_email(&self, email: &str) -> DomainResult<User> {
        (**self).get_by_email(email).await
    }

    async fn update(&self, user: User) -> DomainResult<()> {
        (**self).update(user).await
    }
}

#[async_trait]
impl<S> PlanStore for Arc<S>
where
    S: PlanStore + ?Sized,
{
    async fn get(&self, id: PlanId) -> DomainResult<Plan> {
        (**self).get(id).await
    }

    async fn list(&self) -> DomainResult<Vec<Plan>> {
        (**self).list().await
    }

    async fn subscribe_user(&self, user: UserId, plan: PlanId) -> DomainResult<()> {
        (**self).subscribe_user(user, plan).await
    }

    async fn subscription(&self, user: UserId) -> DomainResult<Option<PlanId>> {
        (**self).subscription(user).await
    }
}

fn poisoned() -> DomainError {
    DomainError::conflict("store lock poisoned")
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory implementations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> DomainResult<()> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        if map.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DomainError::conflict(format!(
                "email {} is already registered",
                user.email
            )));
        }
        map.insert(user.id, user);
        Ok(())
    }

    async fn get(&self, id: UserId) -> DomainResult<User> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        map.get(&id).cloned().ok_or(DomainError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> DomainResult<User> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        map.values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    async fn update(&self, user: User) -> DomainResult<()> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        match map.get_mut(&user.id) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(DomainError::NotFound),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<PlanId, Plan>>,
    subscriptions: RwLock<HashMap<UserId, PlanId>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        Self {
            plans: RwLock::new(plans.into_iter().map(|p| (p.id, p)).collect()),
            subscriptions: RwLock::default(),
        }
    }

    /// The plans a fresh development instance offers.
    pub fn seeded() -> Self {
        Self::with_plans([
            Plan::new("Bronze Plan", 1000),
            Plan::new("Silver Plan", 2000),
            Plan::new("Gold Plan", 3000),
        ])
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn get(&self, id: PlanId) -> DomainResult<Plan> {
        let plans = self.plans.read().map_err(|_| poisoned())?;
        plans.get(&id).cloned().ok_or(DomainError::NotFound)
    }

    async fn list(&self) -> DomainResult<Vec<Plan>> {
        let plans = self.plans.read().map_err(|_| poisoned())?;
        let mut all: Vec<Plan> = plans.values().cloned().collect();
        all.sort_by_key(|p| p.amount_cents);
        Ok(all)
    }

    async fn subscribe_user(&self, user: UserId, plan: PlanId) -> DomainResult<()> {
        if !self.plans.read().map_err(|_| poisoned())?.contains_key(&plan) {
            return Err(DomainError::NotFound);
        }
        self.subscriptions
            .write()
            .map_err(|_| poisoned())?
            .insert(user, plan);
        Ok(())
    }

    async fn subscription(&self, user: UserId) -> DomainResult<Option<PlanId>> {
        let subs = self.subscriptions.read().map_err(|_| poisoned())?;
        Ok(subs.get(&user).copied())
    }
}

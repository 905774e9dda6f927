//! Plan subscription: records the subscription, mails an invoice, and
//! generates and mails the plan manual in the background.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use subscriptions_core::{DomainError, Plan, PlanId, User, UserId};
use subscriptions_infra::{JobError, Message, SpawnError};
use tracing::info;

use crate::background::Background;
use crate::render::ManualRenderer;
use crate::store::{PlanStore, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("background work is no longer accepted: {0}")]
    ShuttingDown(#[from] SpawnError),
}

#[derive(Clone)]
pub struct SubscriptionService {
    users: Arc<dyn UserStore>,
    plans: Arc<dyn PlanStore>,
    renderer: Arc<dyn ManualRenderer>,
    tmp_path: PathBuf,
    background: Background,
}

impl SubscriptionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        plans: Arc<dyn PlanStore>,
        renderer: Arc<dyn ManualRenderer>,
        tmp_path: impl Into<PathBuf>,
        background: Background,
    ) -> Self {
        Self {
            users,
            plans,
            renderer,
            tmp_path: tmp_path.into(),
            background,
        }
    }

    /// Subscribe `user_id` to `plan_id` and return the updated user.
    ///
    /// Returns as soon as the subscription is stored. The invoice mail and
    /// the manual job run afterwards; their failures only reach the error
    /// sink.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<User, SubscriptionError> {
        let plan = self.plans.get(plan_id).await?;
        let mut user = self.users.get(user_id).await?;

        self.background.send_mail(
            "invoice-mail",
            Message::new(&user.email, "Your invoice")
                .with_template("invoice")
                .with_data(json!({ "amount": plan.amount_for_display() })),
        )?;

        self.background.spawn(
            "manual",
            generate_and_mail_manual(
                Arc::clone(&self.renderer),
                self.background.clone(),
                self.tmp_path.clone(),
                user.clone(),
                plan.clone(),
            ),
        )?;

        self.plans.subscribe_user(user.id, plan.id).await?;
        user.plan = Some(plan);
        self.users.update(user.clone()).await?;

        info!(user_id = %user.id, plan_id = %plan_id, "user subscribed");
        Ok(user)
    }
}

/// Where the manual for `user` is written.
pub fn manual_path(tmp_path: &Path, user: UserId) -> PathBuf {
    tmp_path.join(format!("{user}_manual.pdf"))
}

async fn generate_and_mail_manual(
    renderer: Arc<dyn ManualRenderer>,
    background: Background,
    tmp_path: PathBuf,
    user: User,
    plan: Plan,
) -> Result<(), JobError> {
    let bytes = renderer.render(&user, &plan).await?;

    let path = manual_path(&tmp_path, user.id);
    tokio::fs::create_dir_all(&tmp_path)
        .await
        .map_err(|e| JobError::io(&tmp_path, e))?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| JobError::io(&path, e))?;

    // Already inside a tracked job, so wait for queue space here instead of
    // spawning another job.
    background
        .mail()
        .send(
            Message::new(&user.email, "Your manual")
                .with_data("Your user manual is attached")
                .with_attachment(path, "Manual.pdf"),
        )
        .await?;
    Ok(())
}

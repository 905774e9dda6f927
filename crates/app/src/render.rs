//! Manual generation seam.
//!
//! Real PDF layout is out of scope. [`TextManualRenderer`] produces a small
//! plain-text document so development runs exercise the full write-and-mail
//! path.

use async_trait::async_trait;
use subscriptions_core::{Plan, User};
use subscriptions_infra::JobError;

/// Renders the personalised user manual for a plan.
///
/// May be slow; always called from a background job.
#[async_trait]
pub trait ManualRenderer: Send + Sync {
    async fn render(&self, user: &User, plan: &Plan) -> Result<Vec<u8>, JobError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextManualRenderer;

#[async_trait]
impl ManualRenderer for TextManualRenderer {
    async fn render(&self, user: &User, plan: &Plan) -> Result<Vec<u8>, JobError> {
        let body = format!(
            "{}\n{} User Guide\n\nThank you for subscribing ({} per month).\n",
            user.full_name(),
            plan.name,
            plan.amount_for_display()
        );
        Ok(body.into_bytes())
    }
}

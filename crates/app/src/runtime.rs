//! Composition root.
//!
//! Starts the long-lived workers (error sink, mail dispatcher), builds the
//! services that feed them, and hands back the orchestrator that will tear
//! everything down.

use std::sync::Arc;

use subscriptions_auth::TokenSigner;
use subscriptions_infra::{
    ErrorSink, LogMailer, MailDispatcher, Mailer, ShutdownOrchestrator, TaskCoordinator,
    TracingErrorLog,
};
use tracing::info;

use crate::accounts::AccountService;
use crate::background::Background;
use crate::config::AppConfig;
use crate::render::{ManualRenderer, TextManualRenderer};
use crate::store::{InMemoryPlanStore, InMemoryUserStore, PlanStore, UserStore};
use crate::subscriptions::SubscriptionService;

/// External collaborators, swapped out in tests.
#[derive(Clone)]
pub struct Collaborators {
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<dyn ManualRenderer>,
    pub users: Arc<dyn UserStore>,
    pub plans: Arc<dyn PlanStore>,
}

impl Collaborators {
    /// Log-only mail, text manuals, and seeded in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            mailer: Arc::new(LogMailer),
            renderer: Arc::new(TextManualRenderer),
            users: Arc::new(InMemoryUserStore::new()),
            plans: Arc::new(InMemoryPlanStore::seeded()),
        }
    }
}

/// What request handlers call. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub subscriptions: SubscriptionService,
    pub coordinator: TaskCoordinator,
}

pub struct Runtime {
    pub services: Services,
    pub orchestrator: ShutdownOrchestrator,
}

impl Runtime {
    /// Start the workers on the current tokio runtime.
    pub fn start(config: AppConfig, deps: Collaborators) -> Self {
        let coordinator = TaskCoordinator::new();
        let (errors, sink) = ErrorSink::spawn(TracingErrorLog);
        let (mail, dispatcher) =
            MailDispatcher::new(deps.mailer, config.mail.clone()).spawn(coordinator.clone());
        let background = Background::new(coordinator.clone(), errors, mail);

        let signer = Arc::new(TokenSigner::new(config.signing_key));

        let accounts = AccountService::new(
            Arc::clone(&deps.users),
            signer,
            config.token_policy,
            config.password_hasher,
            config.http_host,
            background.clone(),
        );
        let subscriptions = SubscriptionService::new(
            deps.users,
            deps.plans,
            deps.renderer,
            config.tmp_path,
            background,
        );

        let orchestrator = ShutdownOrchestrator::new(
            coordinator.clone(),
            dispatcher,
            sink,
            config.shutdown,
        );

        info!(
            mail_host = %config.mail.host,
            mail_port = config.mail.port,
            "background workers started"
        );

        Self {
            services: Services {
                accounts,
                subscriptions,
                coordinator,
            },
            orchestrator,
        }
    }
}

//! Account workflows: registration with an emailed activation link,
//! activation through that link, and password login that warns the owner
//! by mail when a password does not match.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use subscriptions_auth::{PasswordError, PasswordHasher, TokenPolicy, TokenSigner};
use subscriptions_core::{DomainError, NewUser, User};
use subscriptions_infra::{Message, SpawnError};
use tracing::{info, warn};

use crate::background::Background;
use crate::store::UserStore;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Bad signature, tampering, malformed link or expiry. Deliberately not
    /// more specific.
    #[error("invalid or expired activation link")]
    InvalidToken,

    #[error("account is already active")]
    AlreadyActive,

    /// Unknown email or wrong password; the two are not distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account has not been activated")]
    Inactive,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("background work is no longer accepted: {0}")]
    ShuttingDown(#[from] SpawnError),
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    signer: Arc<TokenSigner>,
    policy: TokenPolicy,
    hasher: PasswordHasher,
    http_host: String,
    background: Background,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        signer: Arc<TokenSigner>,
        policy: TokenPolicy,
        hasher: PasswordHasher,
        http_host: impl Into<String>,
        background: Background,
    ) -> Self {
        Self {
            users,
            signer,
            policy,
            hasher,
            http_host: http_host.into(),
            background,
        }
    }

    /// Create an inactive account and mail it a signed activation link.
    ///
    /// Returns the stored user and the link that was mailed.
    pub async fn register(&self, new_user: NewUser) -> Result<(User, String), AccountError> {
        new_user.validate()?;

        let hasher = self.hasher;
        let password = new_user.password.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let user = new_user.into_user(hash, Utc::now())?;
        self.users.insert(user.clone()).await?;

        let link = self
            .signer
            .sign(&format!("{}/activate?email={}", self.http_host, user.email));

        self.background.send_mail(
            "activation-mail",
            Message::new(&user.email, "Activate your account")
                .with_template("confirmation-email")
                .with_data(json!({ "link": link })),
        )?;

        info!(user_id = %user.id, "account registered; activation mail queued");
        Ok((user, link))
    }

    /// Activate the account named by a signed link.
    ///
    /// `request_uri` is the path and query the link was opened with; it is
    /// prefixed with the configured host before verification, so a link
    /// signed for another host never verifies.
    pub async fn activate(&self, request_uri: &str) -> Result<User, AccountError> {
        self.activate_at(request_uri, Utc::now()).await
    }

    pub async fn activate_at(
        &self,
        request_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        let url = format!("{}{}", self.http_host, request_uri);

        let payload = self
            .signer
            .check_at(&url, self.policy.activation_max_age, now)
            .map_err(|err| {
                warn!(error = %err, "rejected activation link");
                AccountError::InvalidToken
            })?;

        let email = query_param(payload, "email").ok_or(AccountError::InvalidToken)?;
        let mut user = self.users.get_by_email(email).await?;

        // Links stay valid until they expire; an active account is the
        // server-side condition that makes a second use a no-op.
        if user.active {
            return Err(AccountError::AlreadyActive);
        }

        user.activate(now);
        self.users.update(user.clone()).await?;

        info!(user_id = %user.id, "account activated");
        Ok(user)
    }

    /// Check `email` and `password`.
    ///
    /// A wrong password for an existing account also mails its owner. The
    /// password is checked before the active flag so an inactive account
    /// does not reveal that it exists.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let user = match self.users.get_by_email(email).await {
            Ok(user) => user,
            Err(DomainError::NotFound) => return Err(AccountError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        };

        let hasher = self.hasher;
        let plain = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await?;

        if !matches {
            warn!(user_id = %user.id, "failed login attempt");
            self.notify_failed_login(&user)?;
            return Err(AccountError::InvalidCredentials);
        }
        if !user.active {
            return Err(AccountError::Inactive);
        }

        info!(user_id = %user.id, "login succeeded");
        Ok(user)
    }

    fn notify_failed_login(&self, user: &User) -> Result<(), SpawnError> {
        self.background.send_mail(
            "failed-login-mail",
            Message::new(&user.email, "Failed login attempt").with_data("Invalid login attempt!"),
        )
    }
}

/// Value of `name` in the query string of `url`, if present.
fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use subscriptions_auth::SigningKey;
    use subscriptions_infra::{
        ErrorEvent, ErrorSink, ErrorSinkHandle, JobErrorLog, MailConfig, MailDispatcher,
        MailDispatcherHandle, MailError, Mailer, TaskCoordinator,
    };

    const HOST: &str = "http://localhost:8080";

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &Message) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingLog {
        seen: Mutex<Vec<String>>,
    }

    impl JobErrorLog for CollectingLog {
        fn record(&self, event: &ErrorEvent) {
            self.seen.lock().unwrap().push(event.to_string());
        }
    }

    struct Fixture {
        service: AccountService,
        users: Arc<InMemoryUserStore>,
        mailer: Arc<RecordingMailer>,
        coordinator: TaskCoordinator,
        mail: MailDispatcherHandle,
        sink: ErrorSinkHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let users = Arc::new(InMemoryUserStore::new());
            let mailer = Arc::new(RecordingMailer::default());
            let coordinator = TaskCoordinator::new();
            let (reporter, sink) = ErrorSink::spawn(Arc::new(CollectingLog::default()));
            let (queue, mail) =
                MailDispatcher::new(mailer.clone(), MailConfig::default()).spawn(coordinator.clone());

            let service = AccountService::new(
                users.clone(),
                Arc::new(TokenSigner::new(SigningKey::new("test-secret"))),
                TokenPolicy::default(),
                PasswordHasher::new(4).unwrap(),
                HOST,
                Background::new(coordinator.clone(), reporter, queue),
            );

            Self {
                service,
                users,
                mailer,
                coordinator,
                mail,
                sink,
            }
        }

        async fn settle(self) -> Vec<Message> {
            self.coordinator.drain().await;
            self.mail.stop().await.unwrap();
            self.sink.stop().await.unwrap();
            self.mailer.sent.lock().unwrap().clone()
        }
    }

    fn ada() -> NewUser {
        NewUser {
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: "analytical-engine".to_string(),
        }
    }

    fn request_uri(link: &str) -> &str {
        link.strip_prefix(HOST).unwrap()
    }

    #[tokio::test]
    async fn register_mails_a_signed_activation_link() {
        let fx = Fixture::new();
        let (user, link) = fx.service.register(ada()).await.unwrap();

        assert!(!user.active);
        assert!(link.starts_with("http://localhost:8080/activate?email=ada@example.com&hash="));

        let sent = fx.settle().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[0].subject, "Activate your account");
        assert_eq!(sent[0].template.as_deref(), Some("confirmation-email"));
        assert_eq!(sent[0].data["link"], link);
    }

    #[tokio::test]
    async fn valid_link_activates_once() {
        let fx = Fixture::new();
        let (_, link) = fx.service.register(ada()).await.unwrap();

        let user = fx.service.activate(request_uri(&link)).await.unwrap();
        assert!(user.active);
        assert!(fx.users.get_by_email("ada@example.com").await.unwrap().active);

        assert!(matches!(
            fx.service.activate(request_uri(&link)).await,
            Err(AccountError::AlreadyActive)
        ));
        fx.settle().await;
    }

    #[tokio::test]
    async fn tampered_link_is_rejected() {
        let fx = Fixture::new();
        fx.service.register(ada()).await.unwrap();
        let (_, link) = fx
            .service
            .register(NewUser {
                email: "eve@example.com".to_string(),
                ..ada()
            })
            .await
            .unwrap();

        // Swap the email for another registered account, keep the signature.
        let forged = request_uri(&link).replace("eve@example.com", "ada@example.com");
        assert!(matches!(
            fx.service.activate(&forged).await,
            Err(AccountError::InvalidToken)
        ));
        assert!(!fx.users.get_by_email("ada@example.com").await.unwrap().active);
        fx.settle().await;
    }

    #[tokio::test]
    async fn expired_link_is_rejected() {
        let fx = Fixture::new();
        let (_, link) = fx.service.register(ada()).await.unwrap();

        let later = Utc::now() + chrono::Duration::minutes(61);
        assert!(matches!(
            fx.service.activate_at(request_uri(&link), later).await,
            Err(AccountError::InvalidToken)
        ));
        fx.settle().await;
    }

    #[tokio::test]
    async fn register_stores_a_hash_not_the_password() {
        let fx = Fixture::new();
        let (user, _) = fx.service.register(ada()).await.unwrap();

        assert_ne!(user.password_hash, "analytical-engine");
        assert!(PasswordHasher::default().verify("analytical-engine", &user.password_hash));
        fx.settle().await;
    }

    #[tokio::test]
    async fn register_without_password_stores_nothing() {
        let fx = Fixture::new();
        let err = fx
            .service
            .register(NewUser {
                password: String::new(),
                ..ada()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Domain(DomainError::Validation(_))));
        assert!(fx.users.get_by_email("ada@example.com").await.is_err());
        assert!(fx.settle().await.is_empty());
    }

    #[tokio::test]
    async fn login_succeeds_once_activated() {
        let fx = Fixture::new();
        let (_, link) = fx.service.register(ada()).await.unwrap();
        fx.service.activate(request_uri(&link)).await.unwrap();

        let user = fx
            .service
            .login("ada@example.com", "analytical-engine")
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let sent = fx.settle().await;
        assert!(sent.iter().all(|m| m.subject != "Failed login attempt"));
    }

    #[tokio::test]
    async fn login_before_activation_is_rejected() {
        let fx = Fixture::new();
        fx.service.register(ada()).await.unwrap();

        assert!(matches!(
            fx.service.login("ada@example.com", "analytical-engine").await,
            Err(AccountError::Inactive)
        ));
        let sent = fx.settle().await;
        assert!(sent.iter().all(|m| m.subject != "Failed login attempt"));
    }

    #[tokio::test]
    async fn wrong_password_mails_the_owner() {
        let fx = Fixture::new();
        let (_, link) = fx.service.register(ada()).await.unwrap();
        fx.service.activate(request_uri(&link)).await.unwrap();

        assert!(matches!(
            fx.service.login("ada@example.com", "difference-engine").await,
            Err(AccountError::InvalidCredentials)
        ));

        let sent = fx.settle().await;
        let warnings: Vec<_> = sent
            .iter()
            .filter(|m| m.subject == "Failed login attempt")
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to, "ada@example.com");
        assert_eq!(warnings[0].data, "Invalid login attempt!");
    }

    #[tokio::test]
    async fn wrong_password_on_inactive_account_reads_as_bad_credentials() {
        let fx = Fixture::new();
        fx.service.register(ada()).await.unwrap();

        assert!(matches!(
            fx.service.login("ada@example.com", "difference-engine").await,
            Err(AccountError::InvalidCredentials)
        ));
        let sent = fx.settle().await;
        assert!(sent.iter().any(|m| m.subject == "Failed login attempt"));
    }

    #[tokio::test]
    async fn unknown_email_is_bad_credentials_without_mail() {
        let fx = Fixture::new();

        assert!(matches!(
            fx.service.login("nobody@example.com", "anything").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(fx.settle().await.is_empty());
    }

    #[test]
    fn query_param_reads_named_value() {
        let url = "http://h/activate?email=a@b.com&hash=1.ab";
        assert_eq!(query_param(url, "email"), Some("a@b.com"));
        assert_eq!(query_param(url, "missing"), None);
        assert_eq!(query_param("http://h/activate", "email"), None);
        assert_eq!(query_param("http://h/activate?email=", "email"), None);
    }
}

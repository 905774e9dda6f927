//! Startup configuration, read once from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use subscriptions_auth::{PasswordHasher, SigningKey, TokenPolicy};
use subscriptions_infra::{MailConfig, ShutdownOptions};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the composition root needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub signing_key: SigningKey,
    /// Scheme and host prefixed to links in outgoing mail, e.g. `http://localhost:8080`.
    pub http_host: String,
    pub token_policy: TokenPolicy,
    pub password_hasher: PasswordHasher,
    pub shutdown: ShutdownOptions,
    pub mail: MailConfig,
    /// Directory generated manuals are written to before they are mailed.
    pub tmp_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let secret = get("TOKEN_SECRET").ok_or(ConfigError::Missing("TOKEN_SECRET"))?;

        let http_host = get("HTTP_HOST")
            .map(|h| h.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost".to_string());

        let max_age: i64 = parse_or(&get, "ACTIVATION_TOKEN_MAX_AGE_MINUTES", 60)?;
        if max_age <= 0 {
            return Err(invalid(
                "ACTIVATION_TOKEN_MAX_AGE_MINUTES",
                max_age.to_string(),
                "must be positive",
            ));
        }

        let password_hasher = match get("PASSWORD_HASH_COST") {
            None => PasswordHasher::default(),
            Some(raw) => {
                let cost = parse("PASSWORD_HASH_COST", &raw)?;
                PasswordHasher::new(cost)
                    .map_err(|err| invalid("PASSWORD_HASH_COST", raw, err.to_string()))?
            }
        };

        let drain_timeout = match get("SHUTDOWN_DRAIN_TIMEOUT_SECS") {
            None => None,
            Some(raw) => Some(Duration::from_secs(parse("SHUTDOWN_DRAIN_TIMEOUT_SECS", &raw)?)),
        };

        let defaults = MailConfig::default();
        let mail = MailConfig {
            domain: get("MAIL_DOMAIN").unwrap_or(defaults.domain),
            host: get("MAIL_HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "MAIL_PORT", defaults.port)?,
            encryption: get("MAIL_ENCRYPTION").unwrap_or(defaults.encryption),
            from_address: get("MAIL_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_name: get("MAIL_FROM_NAME").unwrap_or(defaults.from_name),
            queue_size: parse_or(&get, "MAIL_QUEUE_SIZE", defaults.queue_size)?,
        };
        if mail.queue_size == 0 {
            return Err(invalid("MAIL_QUEUE_SIZE", "0", "must be at least 1"));
        }

        Ok(Self {
            signing_key: SigningKey::new(secret),
            http_host,
            token_policy: TokenPolicy {
                activation_max_age: chrono::Duration::minutes(max_age),
            },
            password_hasher,
            shutdown: ShutdownOptions { drain_timeout },
            mail,
            tmp_path: get("TMP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./tmp")),
        })
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| invalid(var, raw, err.to_string()))
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => parse(var, &raw),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.into(),
        reason: reason.into(),
    }
}

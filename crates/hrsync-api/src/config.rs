//! Environment configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use hrsync_assets::{AssetClientConfig, AttributeIds, RoleTypeConfig};
use hrsync_core::retry::RetryPolicy;
use hrsync_sync::processing::ProcessingOptions;

use crate::error::AppError;

/// Webhook ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// HMAC-SHA256 secret; when set, every webhook must carry a valid
    /// `x-webhook-signature` header.
    pub signing_secret: Option<String>,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub processing: ProcessingOptions,
    pub poll_interval: Duration,
    pub webhook: WebhookConfig,
    pub assets: AssetClientConfig,
    pub attribute_ids: AttributeIds,
    /// OTLP collector endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable that is missing
    /// or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable that is missing
    /// or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let claim_timeout_secs: u64 = env.parse_or("SYNC_CLAIM_TIMEOUT_SECS", 300)?;
        let processing = ProcessingOptions {
            batch_size: env.parse_or("SYNC_BATCH_SIZE", 10)?,
            retry_policy: retry_policy(&env)?,
            claim_timeout: (claim_timeout_secs > 0)
                .then(|| Duration::from_secs(claim_timeout_secs)),
        };

        let defaults = AttributeIds::default();
        let attribute_ids = AttributeIds {
            name: env.parse_or("ASSETS_ATTR_NAME", defaults.name)?,
            job_role: env.parse_or("ASSETS_ATTR_JOB_ROLE", defaults.job_role)?,
            department: env.parse_or("ASSETS_ATTR_DEPARTMENT", defaults.department)?,
            email: env.parse_or("ASSETS_ATTR_EMAIL", defaults.email)?,
            start_date: env.parse_or("ASSETS_ATTR_START_DATE", defaults.start_date)?,
            status: env.parse_or("ASSETS_ATTR_STATUS", defaults.status)?,
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            database_max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env.get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: env.parse_or("PORT", 3000)?,
            processing,
            poll_interval: Duration::from_secs(env.parse_or("SYNC_POLL_INTERVAL_SECS", 15)?),
            webhook: WebhookConfig {
                signing_secret: env.get("WEBHOOK_SIGNING_SECRET"),
                max_body_bytes: env
                    .parse_or("WEBHOOK_MAX_BODY_BYTES", WebhookConfig::default().max_body_bytes)?,
            },
            assets: AssetClientConfig {
                base_url: env.required("ASSETS_BASE_URL")?,
                user: env.required("ASSETS_USER")?,
                api_token: env.required("ASSETS_API_TOKEN")?,
                object_type_id: env.required("ASSETS_OBJECT_TYPE_ID")?,
                roles: RoleTypeConfig {
                    object_type_id: env.required("ASSETS_ROLE_OBJECT_TYPE_ID")?,
                    object_type_name: env
                        .get("ASSETS_ROLE_OBJECT_TYPE_NAME")
                        .unwrap_or_else(|| "Role".to_owned()),
                    name_attribute_id: env.parse_or("ASSETS_ATTR_ROLE_NAME", 78)?,
                },
                timeout: Duration::from_secs(env.parse_or("ASSETS_TIMEOUT_SECS", 30)?),
            },
            attribute_ids,
            otlp_endpoint: env.get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}

fn retry_policy<F>(env: &Env<'_, F>) -> Result<RetryPolicy, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = env.get("SYNC_RETRY_MODE").unwrap_or_else(|| "terminal".to_owned());
    match mode.to_ascii_lowercase().as_str() {
        "terminal" => Ok(RetryPolicy::Terminal),
        "requeue" => Ok(RetryPolicy::Requeue {
            max_retries: env.parse_or("SYNC_MAX_RETRIES", 5)?,
            base_delay: Duration::from_secs(env.parse_or("SYNC_RETRY_BASE_SECS", 30)?),
            max_delay: Duration::from_secs(env.parse_or("SYNC_RETRY_MAX_SECS", 3600)?),
        }),
        other => Err(AppError::Config(format!(
            "SYNC_RETRY_MODE must be `terminal` or `requeue`, got `{other}`"
        ))),
    }
}

/// Typed accessors over a variable lookup. Blank values count as unset.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, AppError> {
        self.get(key)
            .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
            None => Ok(default),
        }
    }
}

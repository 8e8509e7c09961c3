// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SenderError;
use std::env;
use std::time::Duration;

pub const HOST_ENV: &str = "OBSERVE_HOST";
pub const CUSTOMER_ID_ENV: &str = "OBSERVE_CUSTOMERID";
pub const AUTH_TOKEN_ENV: &str = "OBSERVE_AUTHTOKEN";

/// Path segment used under `/v1/http/` when the caller does not pick one.
pub const DEFAULT_PATH: &str = "observe-sender";

const DEFAULT_KEEPALIVE_INTERVAL_SECS: f64 = 30.0;
const MAX_KEEPALIVE_INTERVAL_SECS: f64 = 300.0;
const DEFAULT_BATCH_SEND_DELAY_SECS: f64 = 1.0;
const MIN_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_MAX_BACKLOG_SAVE: usize = 256 * 1024;
const MAX_BACKLOG_SAVE_LIMIT: usize = 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;
const MAX_REQUEST_TIMEOUT_SECS: f64 = 300.0;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for a [`Sender`](crate::sender::Sender).
///
/// Build it with [`SenderConfig::from_env`] and override single fields with the
/// `with_*` methods; explicit values always win over the environment.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Bare site domain (`eu1.observeinc.com`) or a full collector URL.
    pub host: Option<String>,
    /// Observe customer id, used as the collector subdomain.
    pub customer_id: Option<String>,
    /// Datastream token sent as a bearer token.
    pub auth_token: Option<String>,
    /// Optional path segment under `/v1/http/`.
    pub path: Option<String>,
    /// `None` merges metadata flat, `Some("")` omits it, `Some(key)` nests it.
    pub metadata_key: Option<String>,
    /// Turn the sender into a no-op instead of failing on missing config.
    pub accept_no_config: bool,
    /// Log every POST at info level.
    pub log_sends: bool,
    /// Add the `kind` passed to `enqueue` to each record. Off by default so
    /// records go out exactly as enqueued plus metadata.
    pub record_kind: bool,
    /// Emit a keepalive record when nothing was sent for this long.
    pub keepalive_interval: Duration,
    /// Batch records for at least this long before sending.
    pub batch_send_delay: Duration,
    /// Approximate byte cap for a failed batch kept for retry.
    pub max_backlog_save: usize,
    /// Per-request timeout; a request running longer counts as failed.
    pub request_timeout: Duration,
    /// HTTPS proxy URL.
    pub https_proxy: Option<String>,
    /// Log level for [`crate::logger::init`].
    pub log_level: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: None,
            customer_id: None,
            auth_token: None,
            path: None,
            metadata_key: None,
            accept_no_config: false,
            log_sends: false,
            record_kind: false,
            keepalive_interval: Duration::from_secs_f64(DEFAULT_KEEPALIVE_INTERVAL_SECS),
            batch_send_delay: Duration::from_secs_f64(DEFAULT_BATCH_SEND_DELAY_SECS),
            max_backlog_save: DEFAULT_MAX_BACKLOG_SAVE,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl SenderConfig {
    /// Create configuration from `OBSERVE_*` environment variables.
    ///
    /// Tunables are clamped to sane ranges; unparsable values fall back to
    /// their defaults. Missing connection settings are not an error here,
    /// they are reported by [`SenderConfig::validate`].
    #[must_use]
    pub fn from_env() -> Self {
        let keepalive_secs = env_f64("OBSERVE_KEEPALIVE_INTERVAL")
            .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL_SECS)
            .clamp(MIN_INTERVAL_SECS, MAX_KEEPALIVE_INTERVAL_SECS);
        let batch_secs = env_f64("OBSERVE_BATCH_SEND_DELAY")
            .unwrap_or(DEFAULT_BATCH_SEND_DELAY_SECS)
            .clamp(MIN_INTERVAL_SECS, keepalive_secs);
        let max_backlog_save = env::var("OBSERVE_MAX_BACKLOG_SAVE")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BACKLOG_SAVE)
            .min(MAX_BACKLOG_SAVE_LIMIT);
        let timeout_secs = env_f64("OBSERVE_REQUEST_TIMEOUT")
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
            .clamp(MIN_INTERVAL_SECS, MAX_REQUEST_TIMEOUT_SECS);
        let https_proxy = env::var("OBSERVE_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok()
            .filter(|val| !val.is_empty());
        let log_level = env::var("OBSERVE_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        let log_sends = env::var("OBSERVE_LOG_SENDS")
            .ok()
            .and_then(|val| parse_env_bool(&val))
            .unwrap_or(false);

        Self {
            host: env_non_empty(HOST_ENV),
            customer_id: env_non_empty(CUSTOMER_ID_ENV),
            auth_token: env_non_empty(AUTH_TOKEN_ENV),
            path: env_non_empty("OBSERVE_PATH"),
            // An empty OBSERVE_METADATA_KEY is meaningful: it disables metadata.
            metadata_key: env::var("OBSERVE_METADATA_KEY").ok(),
            accept_no_config: false,
            log_sends,
            record_kind: false,
            keepalive_interval: Duration::from_secs_f64(keepalive_secs),
            batch_send_delay: Duration::from_secs_f64(batch_secs),
            max_backlog_save,
            request_timeout: Duration::from_secs_f64(timeout_secs),
            https_proxy,
            log_level,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_metadata_key(mut self, metadata_key: impl Into<String>) -> Self {
        self.metadata_key = Some(metadata_key.into());
        self
    }

    #[must_use]
    pub fn with_accept_no_config(mut self, accept_no_config: bool) -> Self {
        self.accept_no_config = accept_no_config;
        self
    }

    #[must_use]
    pub fn with_log_sends(mut self, log_sends: bool) -> Self {
        self.log_sends = log_sends;
        self
    }

    #[must_use]
    pub fn with_record_kind(mut self, record_kind: bool) -> Self {
        self.record_kind = record_kind;
        self
    }

    /// Names of the required environment variables that have no value.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.host.as_deref()) {
            missing.push(HOST_ENV);
        }
        if is_blank(self.customer_id.as_deref()) {
            missing.push(CUSTOMER_ID_ENV);
        }
        if is_blank(self.auth_token.as_deref()) {
            missing.push(AUTH_TOKEN_ENV);
        }
        missing
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Check that host, customer id and auth token are all present.
    pub fn validate(&self) -> Result<(), SenderError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(SenderError::Config {
                missing: missing.join(", "),
            });
        }
        Ok(())
    }

    /// Check that the log level is one [`crate::logger::init`] understands.
    pub fn validate_log_level(&self) -> Result<(), SenderError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(SenderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Collector URL for this configuration, or `None` when incomplete.
    ///
    /// A host containing `/` is treated as a full URL and only gets the
    /// `/v1/http/{path}` suffix; a bare domain becomes
    /// `https://{customer_id}.collect.{host}/v1/http/{path}`.
    #[must_use]
    pub fn derive_url(&self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        let host = self.host.as_deref()?.trim();
        let customer_id = self.customer_id.as_deref()?.trim();

        let path = self
            .path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PATH);
        let url_path = format!("/v1/http/{path}");

        if host.contains('/') {
            Some(format!("{}{url_path}", host.trim_end_matches('/')))
        } else {
            Some(format!("https://{customer_id}.collect.{host}{url_path}"))
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn env_f64(name: &str) -> Option<f64> {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<f64>().ok())
        .filter(|val| val.is_finite())
}

/// Parse a boolean coming from environment variables.
///
/// Accepts common truthy/falsy strings (case insensitive) including numeric forms.
fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

use std::{str::FromStr, time::Duration};

use crate::{DeliveryError, Result, RetryPolicy};

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = "order-api/1.0.0";

/// Configures HTTP timeouts, connection limits and retry behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Time allowed to establish a connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Time allowed between reads of the response, in milliseconds.
    pub read_timeout_ms: u64,
    /// Time allowed to send the request, in milliseconds.
    pub write_timeout_ms: u64,
    /// Time allowed to wait for a free connection slot, in milliseconds.
    pub pool_timeout_ms: u64,
    /// Maximum number of connections in use at once.
    pub max_connections: usize,
    /// Maximum number of idle keep-alive connections per host.
    pub max_keepalive_connections: usize,
    /// Whole-request timeout of the health probe, in milliseconds.
    pub health_timeout_ms: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Retry and backoff policy for [`crate::DeliveryClient::call`].
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 10_000,
            pool_timeout_ms: 5_000,
            max_connections: 100,
            max_keepalive_connections: 20,
            health_timeout_ms: 5_000,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientOptions {
    /// Reads options from `HTTP_*` environment variables.
    ///
    /// Timeouts are given in seconds (`HTTP_CONNECT_TIMEOUT`,
    /// `HTTP_READ_TIMEOUT`, `HTTP_WRITE_TIMEOUT`, `HTTP_POOL_TIMEOUT`,
    /// `HTTP_HEALTH_TIMEOUT`), `HTTP_RETRY_BACKOFF_FACTOR` as float seconds.
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_CONNECT_TIMEOUT")? {
            options.connect_timeout_ms = seconds_to_ms("HTTP_CONNECT_TIMEOUT", secs)?;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_READ_TIMEOUT")? {
            options.read_timeout_ms = seconds_to_ms("HTTP_READ_TIMEOUT", secs)?;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_WRITE_TIMEOUT")? {
            options.write_timeout_ms = seconds_to_ms("HTTP_WRITE_TIMEOUT", secs)?;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_POOL_TIMEOUT")? {
            options.pool_timeout_ms = seconds_to_ms("HTTP_POOL_TIMEOUT", secs)?;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_HEALTH_TIMEOUT")? {
            options.health_timeout_ms = seconds_to_ms("HTTP_HEALTH_TIMEOUT", secs)?;
        }
        if let Some(max) = parse_var(&lookup, "HTTP_MAX_CONNECTIONS")? {
            options.max_connections = max;
        }
        if let Some(max) = parse_var(&lookup, "HTTP_MAX_KEEPALIVE_CONNECTIONS")? {
            options.max_keepalive_connections = max;
        }
        if let Some(retries) = parse_var(&lookup, "HTTP_MAX_RETRIES")? {
            options.retry.max_retries = retries;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "HTTP_RETRY_BACKOFF_FACTOR")? {
            options.retry.backoff_factor = Duration::try_from_secs_f64(secs).map_err(|err| {
                DeliveryError::Config(format!(
                    "HTTP_RETRY_BACKOFF_FACTOR must be a non-negative number of seconds, \
                     got {secs}: {err}"
                ))
            })?;
        }
        if let Some(version) = lookup("SERVICE_VERSION").filter(|v| !v.trim().is_empty()) {
            options.user_agent = format!("order-api/{}", version.trim());
        }

        options.validate()?;
        Ok(options)
    }

    /// Checks values that would make the client unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(DeliveryError::Config(
                "max_connections must be at least 1".to_owned(),
            ));
        }
        if self.read_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(DeliveryError::Config(
                "connect and read timeouts must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Upper bound of one whole attempt: connect, write and read phases.
    pub(crate) fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(
            self.connect_timeout_ms
                .saturating_add(self.write_timeout_ms)
                .saturating_add(self.read_timeout_ms),
        )
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|err| DeliveryError::Config(format!("invalid {key} '{raw}': {err}")))
}

fn seconds_to_ms(key: &str, secs: f64) -> Result<u64> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(DeliveryError::Config(format!(
            "{key} must be a non-negative number of seconds, got {secs}"
        )));
    }
    Ok((secs * 1_000.0).round() as u64)
}

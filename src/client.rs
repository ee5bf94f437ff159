use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use tokio::{
    sync::{Semaphore, SemaphorePermit},
    time::{sleep, timeout},
};
use tracing::{info_span, Instrument};

use crate::{
    error::truncate_body,
    retry::{Attempt, RetryDecision},
    ClientOptions, DeliveryError, DeliveryRequest, DeliveryResponse, ErrorCategory, HealthStatus,
    OutboundRequest, Result,
};

/// Path accepting order payloads on the Delivery API.
pub const DELIVERY_PATH: &str = "/api/delivery";
/// Liveness endpoint of the Delivery API.
pub const HEALTH_PATH: &str = "/api/delivery/health";
/// Base URL used by [`DeliveryClient::from_env`] when `DELIVERY_API_URL` is unset.
pub const DEFAULT_DELIVERY_API_URL: &str = "http://delivery-api-service:5000";

#[derive(Clone)]
/// HTTP client for the Delivery API with transparent retries.
///
/// Cloning is cheap: clones share the connection pool and the connection
/// limit, so one instance should be built at startup and handed to every
/// caller.
pub struct DeliveryClient {
    http: reqwest::Client,
    base_url: String,
    options: ClientOptions,
    slots: Arc<Semaphore>,
}

impl fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("free_slots", &self.slots.available_permits())
            .finish()
    }
}

impl DeliveryClient {
    /// Creates a client for `base_url` (e.g. `http://delivery-api:5000`).
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Config`] for invalid options or when the
    /// underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(DeliveryError::Config("base URL is empty".to_owned()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(options.connect_timeout_ms))
            .read_timeout(Duration::from_millis(options.read_timeout_ms))
            .pool_max_idle_per_host(options.max_keepalive_connections)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|err| DeliveryError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            slots: Arc::new(Semaphore::new(options.max_connections)),
            options,
        })
    }

    /// Creates a client with [`ClientOptions::default`].
    pub fn with_defaults(base_url: impl Into<String>) -> Result<Self> {
        Self::new(base_url, ClientOptions::default())
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `DELIVERY_API_URL` (falling back to
    /// [`DEFAULT_DELIVERY_API_URL`]) and the `HTTP_*` variables described on
    /// [`ClientOptions::from_env`].
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DELIVERY_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DELIVERY_API_URL.to_owned());
        Self::new(base_url, ClientOptions::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Forwards an order to `POST /api/delivery`.
    ///
    /// A response with `success: false` is returned as-is; use
    /// [`DeliveryResponse::into_accepted`] to treat it as an error.
    pub async fn submit_order(&self, order: &DeliveryRequest) -> Result<DeliveryResponse> {
        let request = OutboundRequest::json(DELIVERY_PATH, order)?;
        let span = info_span!("submit_order", order_id = %order.order_id);

        async move {
            tracing::info!(
                customer_name = %order.customer_name,
                items = order.items.len(),
                base_url = %self.base_url,
                "forwarding order to delivery service"
            );

            let response: DeliveryResponse = self.call(&request).await?;

            tracing::info!(
                success = response.success,
                message = %response.message,
                "delivery service responded"
            );
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Sends `request` as a `POST`, retrying transient failures.
    ///
    /// Makes at most `max_retries + 1` attempts. Client errors and unknown
    /// failures are returned after the first attempt; after the last allowed
    /// attempt the most recent error is returned unchanged.
    ///
    /// Dropping the returned future aborts the in-flight attempt or the
    /// pending backoff sleep; no further attempt is made.
    pub async fn call<T: DeserializeOwned>(&self, request: &OutboundRequest) -> Result<T> {
        let policy = &self.options.retry;
        let started = Instant::now();
        let mut attempt = Attempt::first();

        loop {
            let error = match self
                .send_once(Method::POST, request, self.options.attempt_timeout())
                .await
            {
                Ok(value) => {
                    tracing::debug!(
                        path = request.path(),
                        attempt = attempt.number(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "request succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            match policy.decide(attempt.index, &error) {
                RetryDecision::Retry { category, delay } => {
                    tracing::warn!(
                        path = request.path(),
                        category = %category,
                        attempt = attempt.number(),
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        attempt_ms = attempt.started_at.elapsed().as_millis() as u64,
                        status = ?error.status(),
                        error = %error,
                        "{}, retrying after backoff",
                        describe(category)
                    );
                    sleep(delay).await;
                    attempt = attempt.next();
                }
                RetryDecision::GiveUp { category, reason } => {
                    tracing::error!(
                        path = request.path(),
                        category = %category,
                        attempts = attempt.number(),
                        max_retries = policy.max_retries,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        status = ?error.status(),
                        body = ?error.body(),
                        error = %error,
                        reason = %reason,
                        "{}, giving up",
                        describe(category)
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Probes `GET /api/delivery/health` once, without retries.
    ///
    /// Bounded by `health_timeout_ms` so that a degraded downstream cannot
    /// stall liveness checks. An unhealthy downstream answering 503 yields
    /// [`DeliveryError::Http`].
    pub async fn health_probe(&self) -> Result<HealthStatus> {
        let started = Instant::now();
        let request = OutboundRequest::new(HEALTH_PATH, Bytes::new());
        let result = self
            .send_once::<HealthStatus>(
                Method::GET,
                &request,
                Duration::from_millis(self.options.health_timeout_ms),
            )
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(health) => tracing::debug!(
                status = %health.status,
                version = ?health.version,
                elapsed_ms,
                "delivery service health probe completed"
            ),
            Err(err) => tracing::warn!(
                category = %err.category(),
                status = ?err.status(),
                elapsed_ms,
                error = %err,
                "delivery service health probe failed"
            ),
        }
        result
    }

    /// Performs one physical exchange and decodes the JSON body.
    ///
    /// The connection slot is released before this returns, so callers never
    /// hold it across a backoff sleep.
    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        request: &OutboundRequest,
        deadline: Duration,
    ) -> Result<T> {
        let _slot = self.acquire_slot().await?;

        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = self
            .http
            .request(method, &url)
            .headers(request.headers().clone())
            .timeout(deadline);
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await.map_err(DeliveryError::Transport)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(DeliveryError::Transport)?;

        if !status.is_success() {
            return Err(DeliveryError::Http {
                status: status.as_u16(),
                body: truncate_body(body),
                retry_after,
            });
        }

        match serde_json::from_str::<T>(&body) {
            Ok(value) => Ok(value),
            Err(err) => Err(DeliveryError::Decode {
                status: status.as_u16(),
                message: err.to_string(),
                body: truncate_body(body),
            }),
        }
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>> {
        let wait = Duration::from_millis(self.options.pool_timeout_ms);
        match timeout(wait, self.slots.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DeliveryError::Config(
                "connection limit semaphore closed".to_owned(),
            )),
            Err(_) => Err(DeliveryError::PoolTimeout {
                waited_ms: self.options.pool_timeout_ms,
            }),
        }
    }
}

fn describe(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Timeout => "timeout calling delivery service",
        ErrorCategory::Connection => "connection error calling delivery service",
        ErrorCategory::ServerError => "server error from delivery service",
        ErrorCategory::ClientError => "client error from delivery service",
        ErrorCategory::RateLimit => "rate limited by delivery service",
        ErrorCategory::Unknown => "unexpected error calling delivery service",
    }
}

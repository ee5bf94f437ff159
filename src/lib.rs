//! `delivery-http` is a resilient async HTTP client for the Delivery API.
//!
//! One logical call may span several physical attempts:
//! - [`DeliveryClient::call`] retries timeouts, connection failures, 5xx and
//!   429 responses with exponential backoff and additive jitter
//! - [`DeliveryClient::submit_order`] forwards a typed order payload
//! - [`DeliveryClient::health_probe`] checks liveness with a single attempt
//!
//! Every failure is classified into an [`ErrorCategory`] that drives both the
//! retry decision and the structured `tracing` events.

mod category;
mod client;
mod error;
mod options;
mod request;
mod retry;
mod types;

pub use category::{classify, ErrorCategory, Failure};
pub use client::{DeliveryClient, DEFAULT_DELIVERY_API_URL, DELIVERY_PATH, HEALTH_PATH};
pub use error::DeliveryError;
pub use options::{ClientOptions, DEFAULT_USER_AGENT};
pub use request::OutboundRequest;
pub use retry::{parse_retry_after, Attempt, RetryDecision, RetryPolicy};
pub use types::{
    items_total, DatabaseHealth, DeliveryRequest, DeliveryResponse, HealthStatus, OrderItem,
};

pub type Result<T> = std::result::Result<T, DeliveryError>;

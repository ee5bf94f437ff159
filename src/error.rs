use crate::category::{classify, ErrorCategory, Failure};

/// Maximum number of characters of a downstream body kept for diagnostics.
pub(crate) const MAX_BODY_CHARS: usize = 500;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// No connection slot became free within the pool timeout.
    #[error("timed out after {waited_ms} ms waiting for a free connection")]
    PoolTimeout { waited_ms: u64 },
    /// Non-success HTTP status code with truncated response body.
    #[error("http error {status}: {body}")]
    Http {
        status: u16,
        body: String,
        /// Raw `Retry-After` header value, when present.
        retry_after: Option<String>,
    },
    /// Success status whose body did not match the expected schema.
    #[error("decode error (http {status}): {message}; body: {body}")]
    Decode {
        status: u16,
        message: String,
        body: String,
    },
    /// Request payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Downstream accepted the request but reported `success: false`.
    #[error("order {order_id} rejected by delivery service: {message}")]
    Rejected { order_id: String, message: String },
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DeliveryError {
    /// Normalized failure descriptor used for classification.
    pub fn failure(&self) -> Failure<'_> {
        match self {
            Self::Transport(err) => transport_failure(err),
            Self::PoolTimeout { .. } => Failure::Timeout,
            Self::Http {
                status,
                retry_after,
                ..
            } => Failure::Status {
                status: *status,
                retry_after: retry_after.as_deref(),
            },
            Self::Decode { .. } => Failure::MalformedBody,
            Self::Encode(_) | Self::Rejected { .. } | Self::Config(_) => Failure::Other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        classify(&self.failure())
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Downstream HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Truncated downstream body, if a response was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } | Self::Decode { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Human-readable message reported by the downstream service.
    ///
    /// For HTTP errors this is the `message` field of a JSON error body.
    pub fn downstream_message(&self) -> Option<String> {
        match self {
            Self::Http { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()?
                .get("message")?
                .as_str()
                .map(str::to_owned),
            Self::Rejected { message, .. } => Some(message.clone()),
            _ => None,
        }
    }

    /// Status an HTTP-facing caller should answer with for this error.
    ///
    /// Exhausted transient failures map to 503 (502 for downstream 5xx);
    /// client errors pass the downstream status through.
    pub fn boundary_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::RateLimit => 503,
            ErrorCategory::ServerError => 502,
            ErrorCategory::ClientError => self.status().unwrap_or(400),
            ErrorCategory::Unknown => match self {
                Self::Http { .. } => 502,
                _ => 500,
            },
        }
    }
}

fn transport_failure(err: &reqwest::Error) -> Failure<'static> {
    if err.is_timeout() {
        Failure::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
        // Body read failures (reset, truncated content-length) surface as decode errors.
        Failure::Connect
    } else {
        Failure::Other
    }
}

/// Cuts a downstream body to [`MAX_BODY_CHARS`] characters.
pub(crate) fn truncate_body(mut body: String) -> String {
    if let Some((index, _)) = body.char_indices().nth(MAX_BODY_CHARS) {
        body.truncate(index);
    }
    body
}

use std::fmt;

/// Classification bucket driving retry eligibility and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connect, read or pool-acquire deadline elapsed.
    Timeout,
    /// DNS, connect or other network-level failure.
    Connection,
    /// HTTP 5xx, or a 2xx whose body could not be decoded.
    ServerError,
    /// HTTP 4xx other than 429.
    ClientError,
    /// HTTP 429.
    RateLimit,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::RateLimit => "rate_limit",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` for categories that a fresh attempt may resolve.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::ServerError | Self::RateLimit
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized description of a failed attempt.
///
/// Built from a [`crate::DeliveryError`] so that classification never has to
/// inspect transport-specific error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure<'a> {
    Timeout,
    Connect,
    Status {
        status: u16,
        retry_after: Option<&'a str>,
    },
    /// 2xx response whose body did not match the expected schema.
    MalformedBody,
    Other,
}

impl Failure<'_> {
    /// Server-provided `Retry-After` value, if the failure carried one.
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Failure::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Maps a failure descriptor to its [`ErrorCategory`].
pub fn classify(failure: &Failure<'_>) -> ErrorCategory {
    match *failure {
        Failure::Timeout => ErrorCategory::Timeout,
        Failure::Connect => ErrorCategory::Connection,
        Failure::Status { status: 429, .. } => ErrorCategory::RateLimit,
        Failure::Status { status, .. } if status >= 500 => ErrorCategory::ServerError,
        Failure::Status { status, .. } if (400..500).contains(&status) => {
            ErrorCategory::ClientError
        }
        Failure::Status { .. } => ErrorCategory::Unknown,
        Failure::MalformedBody => ErrorCategory::ServerError,
        Failure::Other => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, ErrorCategory, Failure};

    fn status(status: u16) -> Failure<'static> {
        Failure::Status {
            status,
            retry_after: None,
        }
    }

    #[test]
    fn status_codes_map_to_categories() {
        assert_eq!(classify(&status(500)), ErrorCategory::ServerError);
        assert_eq!(classify(&status(503)), ErrorCategory::ServerError);
        assert_eq!(classify(&status(400)), ErrorCategory::ClientError);
        assert_eq!(classify(&status(404)), ErrorCategory::ClientError);
        assert_eq!(classify(&status(499)), ErrorCategory::ClientError);
        assert_eq!(classify(&status(429)), ErrorCategory::RateLimit);
        assert_eq!(classify(&status(304)), ErrorCategory::Unknown);
    }

    #[test]
    fn transport_failures_map_to_categories() {
        assert_eq!(classify(&Failure::Timeout), ErrorCategory::Timeout);
        assert_eq!(classify(&Failure::Connect), ErrorCategory::Connection);
        assert_eq!(classify(&Failure::MalformedBody), ErrorCategory::ServerError);
        assert_eq!(classify(&Failure::Other), ErrorCategory::Unknown);
    }

    #[test]
    fn only_transient_categories_are_retryable() {
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(ErrorCategory::Connection.is_retryable());
        assert!(ErrorCategory::ServerError.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(!ErrorCategory::ClientError.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn display_uses_snake_case_names() {
        assert_eq!(ErrorCategory::ServerError.to_string(), "server_error");
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
    }
}

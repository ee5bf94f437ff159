use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use crate::{DeliveryError, Result};

/// A serialized request to a downstream path.
///
/// Built once per logical operation and reused unchanged by every attempt.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    path: String,
    body: Bytes,
    headers: HeaderMap,
}

impl OutboundRequest {
    /// Creates a request with a raw body and no headers.
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Serializes `payload` as JSON and sets `Content-Type: application/json`.
    pub fn json<T: Serialize + ?Sized>(path: impl Into<String>, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| DeliveryError::Encode(format!("invalid request payload: {err}")))?;
        Ok(Self::new(path, body).with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
    }

    /// Adds a header, replacing any previous value with the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

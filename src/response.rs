//! Raw and typed responses.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use std::ops::Deref;

use crate::error::{StorageError, StorageResult};
use crate::request::parse_http_date;
use crate::xml::parse_error_body;

/// Response as returned by a transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a header that the operation requires.
    pub fn required_header(&self, name: &str) -> StorageResult<&str> {
        self.header(name).ok_or_else(|| {
            tracing::warn!("response is missing header {}", name);
            StorageError::new(
                crate::error::ErrorKind::Deserialize,
                format!("response is missing the {} header", name),
            )
        })
    }

    /// Parses a header into `T`, treating absence as `None`.
    pub fn parse_header<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.header(name).and_then(|v| v.parse().ok())
    }

    pub fn etag(&self) -> StorageResult<String> {
        self.required_header("etag").map(str::to_string)
    }

    pub fn last_modified(&self) -> StorageResult<DateTime<Utc>> {
        let raw = self.required_header("last-modified")?;
        parse_http_date(raw).ok_or_else(|| {
            StorageError::new(
                crate::error::ErrorKind::Deserialize,
                format!("invalid Last-Modified value '{}'", raw),
            )
        })
    }

    /// Returns `x-ms-meta-*` headers with the prefix stripped.
    pub fn metadata(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                name.as_str()
                    .strip_prefix("x-ms-meta-")
                    .and_then(|key| value.to_str().ok().map(|v| (key.to_string(), v.to_string())))
            })
            .collect()
    }

    /// Returns the body decoded as UTF-8.
    pub fn body_str(&self) -> StorageResult<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| StorageError::deserialize("response body is not valid UTF-8", e))
    }

    /// Converts a non-success response into a classified error.
    ///
    /// The code comes from `x-ms-error-code` when present (HEAD responses have
    /// no body), otherwise from the XML error body.
    pub fn into_error(self) -> StorageError {
        let body = parse_error_body(&self.body);
        let code = self
            .header("x-ms-error-code")
            .map(str::to_string)
            .or_else(|| body.as_ref().and_then(|b| b.code.clone()));
        let message = body
            .and_then(|b| b.message)
            .or_else(|| self.status.canonical_reason().map(str::to_string))
            .unwrap_or_default();
        let request_id = self.header("x-ms-request-id").map(str::to_string);

        StorageError::service(self.status, code, message, request_id)
    }
}

/// Common headers every service response carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub request_id: Option<String>,
    pub client_request_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

impl ResponseHeaders {
    pub fn from_raw(raw: &RawResponse) -> Self {
        Self {
            request_id: raw.header("x-ms-request-id").map(str::to_string),
            client_request_id: raw.header("x-ms-client-request-id").map(str::to_string),
            date: raw.header("date").and_then(parse_http_date),
            version: raw.header("x-ms-version").map(str::to_string),
        }
    }
}

/// A typed operation result plus the response's common headers.
#[derive(Debug, Clone)]
pub struct Response<T> {
    value: T,
    headers: ResponseHeaders,
}

impl<T> Response<T> {
    pub fn new(value: T, headers: ResponseHeaders) -> Self {
        Self { value, headers }
    }

    pub(crate) fn from_raw(raw: &RawResponse, value: T) -> Self {
        Self::new(value, ResponseHeaders::from_raw(raw))
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.request_id.as_deref()
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers.date
    }

    pub fn version(&self) -> Option<&str> {
        self.headers.version.as_deref()
    }

    /// Maps the value, keeping the headers.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            value: f(self.value),
            headers: self.headers,
        }
    }
}

impl<T> Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

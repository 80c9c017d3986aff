//! Outgoing request representation and header helpers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::error::{StorageError, StorageResult};

/// A logical storage request before it is handed to a transport.
///
/// The body is `Bytes` so a request can be resubmitted without copying.
#[derive(Debug, Clone)]
pub struct StorageRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StorageRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Appends a query parameter when a value is present.
    pub fn with_optional_query(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.with_query(name, v),
            None => self,
        }
    }

    /// Sets a header, rejecting values that cannot appear on the wire.
    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> StorageResult<Self> {
        self.insert_header(name, value.as_ref())?;
        Ok(self)
    }

    /// Sets a header when a value is present.
    pub fn with_optional_header(
        self,
        name: &str,
        value: Option<impl AsRef<str>>,
    ) -> StorageResult<Self> {
        match value {
            Some(v) => self.with_header(name, v),
            None => Ok(self),
        }
    }

    /// Merges a prepared header map, replacing existing values.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Adds `x-ms-meta-*` headers for user-defined metadata.
    pub fn with_metadata(mut self, metadata: &HashMap<String, String>) -> StorageResult<Self> {
        for (key, value) in metadata {
            if key.is_empty() {
                return Err(StorageError::invalid_argument("metadata key must not be empty"));
            }
            self.insert_header(&format!("x-ms-meta-{}", key), value)?;
        }
        Ok(self)
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets `Content-MD5` to the MD5 digest of the current body.
    pub fn with_content_md5(mut self) -> StorageResult<Self> {
        let digest = BASE64.encode(Md5::digest(&self.body));
        self.insert_header("content-md5", &digest)?;
        Ok(self)
    }

    pub fn insert_header(&mut self, name: &str, value: &str) -> StorageResult<()> {
        let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).map_err(|e| {
            StorageError::invalid_argument(format!("invalid header name '{}'", name)).with_source(e)
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            StorageError::invalid_argument(format!("invalid value for header '{}'", name))
                .with_source(e)
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the x-ms-* headers sorted alphabetically.
    pub fn ms_headers(&self) -> Vec<(&str, &str)> {
        let mut headers: Vec<_> = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let name_str = name.as_str();
                if name_str.starts_with("x-ms-") {
                    value.to_str().ok().map(|v| (name_str, v))
                } else {
                    None
                }
            })
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        headers
    }

    /// Returns the body length, or the explicit Content-Length header.
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len() as u64)
    }

    /// Returns the value of a query parameter, decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Conditions sent with a request: lease id and ETag / date preconditions.
#[derive(Debug, Clone, Default)]
pub struct AccessConditions {
    pub lease_id: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl AccessConditions {
    pub fn with_lease_id(lease_id: impl Into<String>) -> Self {
        Self {
            lease_id: Some(lease_id.into()),
            ..Default::default()
        }
    }

    pub(crate) fn apply(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        request
            .with_optional_header("x-ms-lease-id", self.lease_id.as_deref())?
            .with_optional_header("if-match", self.if_match.as_deref())?
            .with_optional_header("if-none-match", self.if_none_match.as_deref())?
            .with_optional_header(
                "if-modified-since",
                self.if_modified_since.as_ref().map(format_http_date),
            )?
            .with_optional_header(
                "if-unmodified-since",
                self.if_unmodified_since.as_ref().map(format_http_date),
            )
    }
}

/// A byte range; `length: None` means through the end of the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl HttpRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }
}

impl fmt::Display for HttpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_range(self.offset, self.length))
    }
}

/// Formats a byte range as `bytes=start-end` (inclusive end).
pub fn format_range(offset: u64, length: Option<u64>) -> String {
    match length {
        Some(len) if len > 0 => format!("bytes={}-{}", offset, offset + len - 1),
        _ => format!("bytes={}-", offset),
    }
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Formats a DateTime as ISO 8601 with seven fractional digits.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        dt.format("%Y-%m-%dT%H:%M:%S"),
        dt.timestamp_subsec_nanos().min(999_999_999) / 100
    )
}

/// Parses an HTTP date in RFC 1123 format.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

/// Parses an ISO 8601 timestamp with any number of fractional digits.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

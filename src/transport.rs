//! HTTP transport abstraction.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::{StorageError, StorageResult};
use crate::request::StorageRequest;
use crate::response::RawResponse;

/// Sends a signed request and returns the raw response.
///
/// Implementations must not interpret the status code; non-success
/// responses are returned as `Ok` and classified by the pipeline.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: StorageRequest) -> StorageResult<RawResponse>;
}

/// Transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: StorageRequest) -> StorageResult<RawResponse> {
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(RawResponse::new(status, headers, body))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StorageError {
    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
    StorageError::transport(err.to_string(), retryable, err)
}

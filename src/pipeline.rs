//! Request pipeline: stamping, signing, sending and classifying.

use chrono::Utc;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::auth::{shared_key, StorageCredential};
use crate::config::{ClientOptions, ConnectionString};
use crate::error::StorageResult;
use crate::request::{format_http_date, StorageRequest};
use crate::response::RawResponse;
use crate::transport::{ReqwestTransport, Transport};

/// Shared by every client created from the same service handle.
#[derive(Debug)]
pub struct Pipeline {
    endpoint: Url,
    credential: StorageCredential,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
}

impl Pipeline {
    /// Creates a pipeline that sends with `reqwest`.
    pub fn new(endpoint: Url, credential: StorageCredential, options: ClientOptions) -> Self {
        Self::with_transport(
            endpoint,
            credential,
            options,
            Arc::new(ReqwestTransport::default()),
        )
    }

    /// Creates a pipeline from a storage connection string.
    pub fn from_connection_string(
        connection_string: &str,
        options: ClientOptions,
    ) -> StorageResult<Self> {
        let parsed = ConnectionString::parse(connection_string)?;
        Ok(Self::new(parsed.blob_endpoint()?, parsed.credential()?, options))
    }

    pub fn with_transport(
        endpoint: Url,
        credential: StorageCredential,
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint,
            credential,
            transport,
            options,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn credential(&self) -> &StorageCredential {
        &self.credential
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns a copy of this pipeline with different options.
    pub fn with_options(&self, options: ClientOptions) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            credential: self.credential.clone(),
            transport: Arc::clone(&self.transport),
            options,
        }
    }

    /// Stamps, authorizes and sends a request.
    ///
    /// Non-success statuses come back as classified `StorageError`s.
    pub async fn send(&self, request: StorageRequest) -> StorageResult<RawResponse> {
        let request = self.prepare(request)?;

        tracing::debug!(
            method = %request.method,
            path = %request.url.path(),
            client_request_id = request.header("x-ms-client-request-id").unwrap_or(""),
            "sending request"
        );

        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            let err = response.into_error();
            tracing::debug!(
                status = ?err.status,
                code = err.code.as_deref().unwrap_or(""),
                request_id = err.request_id.as_deref().unwrap_or(""),
                "request failed"
            );
            return Err(err);
        }

        tracing::debug!(
            status = %response.status,
            request_id = response.header("x-ms-request-id").unwrap_or(""),
            "request succeeded"
        );
        Ok(response)
    }

    fn prepare(&self, mut request: StorageRequest) -> StorageResult<StorageRequest> {
        request.insert_header("x-ms-version", &self.options.api_version)?;
        request.insert_header("x-ms-date", &format_http_date(&Utc::now()))?;
        if request.header("x-ms-client-request-id").is_none() {
            request.insert_header("x-ms-client-request-id", &Uuid::new_v4().to_string())?;
        }
        request.insert_header("content-length", &request.body.len().to_string())?;

        match &self.credential {
            StorageCredential::SharedKey(key) => shared_key::sign(&mut request, key)?,
            StorageCredential::SasToken(token) => {
                let mut pairs = request.url.query_pairs_mut();
                for (name, value) in url::form_urlencoded::parse(token.as_bytes()) {
                    pairs.append_pair(&name, &value);
                }
            }
            StorageCredential::Anonymous => {}
        }

        Ok(request)
    }
}

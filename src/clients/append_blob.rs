use bytes::Bytes;
use std::sync::Arc;

use super::{
    BlobOperations, LeaseOperations, ResourceClient, ResourceIdentity, UploadBlobOptions,
};
use crate::encryption::OperationKind;
use crate::error::StorageResult;
use crate::models::BlobContentInfo;
use crate::pipeline::Pipeline;
use crate::request::{AccessConditions, HttpRange, StorageRequest};
use crate::response::Response;

/// Conditions for appending a block.
#[derive(Debug, Clone, Default)]
pub struct AppendBlockOptions {
    pub conditions: AccessConditions,
    /// Fail unless the blob currently has exactly this length.
    pub append_position: Option<u64>,
    /// Fail if the append would grow the blob past this length.
    pub max_size: Option<u64>,
}

impl AppendBlockOptions {
    fn apply(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        let request = request
            .with_optional_header(
                "x-ms-blob-condition-appendpos",
                self.append_position.map(|p| p.to_string()),
            )?
            .with_optional_header(
                "x-ms-blob-condition-maxsize",
                self.max_size.map(|m| m.to_string()),
            )?;
        self.conditions.apply(request)
    }
}

/// Client for append blobs.
#[derive(Debug, Clone)]
pub struct AppendBlobClient {
    identity: ResourceIdentity,
    pipeline: Arc<Pipeline>,
}

impl AppendBlobClient {
    pub fn new(
        pipeline: Arc<Pipeline>,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> StorageResult<Self> {
        let identity = ResourceIdentity::blob(pipeline.endpoint().clone(), container, blob)?;
        Ok(Self { identity, pipeline })
    }

    pub(crate) fn from_parts(identity: ResourceIdentity, pipeline: Arc<Pipeline>) -> Self {
        Self { identity, pipeline }
    }

    /// Creates an empty append blob, replacing any existing blob.
    pub async fn create(
        &self,
        options: &UploadBlobOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_header("x-ms-blob-type", "AppendBlob")?
            .with_headers(self.encryption_headers(OperationKind::CreateAppendBlob)?);
        let request = options.apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Appends `data` as a new block at the end of the blob.
    pub async fn append_block(
        &self,
        data: impl Into<Bytes>,
        options: &AppendBlockOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "appendblock")
            .with_body(data)
            .with_headers(self.encryption_headers(OperationKind::AppendBlock)?);
        let request = self.with_transactional_md5(options.apply(request)?)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Appends a block the service reads from `source_url`.
    pub async fn append_block_from_uri(
        &self,
        source_url: &str,
        source_range: Option<HttpRange>,
        options: &AppendBlockOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "appendblock")
            .with_header("x-ms-copy-source", source_url)?
            .with_optional_header("x-ms-source-range", source_range.map(|r| r.to_string()))?
            .with_headers(self.encryption_headers(OperationKind::AppendBlockFromUri)?);
        let request = options.apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }
}

impl ResourceClient for AppendBlobClient {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl BlobOperations for AppendBlobClient {
    fn with_identity(&self, identity: ResourceIdentity) -> Self {
        Self::from_parts(identity, Arc::clone(&self.pipeline))
    }
}

impl LeaseOperations for AppendBlobClient {
    fn lease_request(&self) -> StorageResult<StorageRequest> {
        Ok(StorageRequest::put(self.url()?).with_query("comp", "lease"))
    }
}

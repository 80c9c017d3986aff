use bytes::Bytes;
use std::sync::Arc;

use super::{
    conditions_or_default, BlobOperations, LeaseOperations, ResourceClient, ResourceIdentity,
    UploadBlobOptions,
};
use crate::encryption::OperationKind;
use crate::error::StorageResult;
use crate::models::{
    validate_block_id, validate_block_ids, BlobContentInfo, BlockList, BlockListType,
    BlockStagedInfo, BlockType,
};
use crate::pipeline::Pipeline;
use crate::request::{AccessConditions, HttpRange, StorageRequest};
use crate::response::Response;
use crate::xml::{parse_block_list, serialize_block_list};

/// Client for block blobs: single-shot upload or staged blocks.
#[derive(Debug, Clone)]
pub struct BlockBlobClient {
    identity: ResourceIdentity,
    pipeline: Arc<Pipeline>,
}

impl BlockBlobClient {
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

    /// Creates or replaces the blob with `data`.
    pub async fn upload(
        &self,
        data: impl Into<Bytes>,
        options: &UploadBlobOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_header("x-ms-blob-type", "BlockBlob")?
            .with_body(data)
            .with_headers(self.encryption_headers(OperationKind::Upload)?);
        let request = self.with_transactional_md5(options.apply(request)?)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Uploads an uncommitted block.
    pub async fn stage_block(
        &self,
        block_id: &str,
        data: impl Into<Bytes>,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<BlockStagedInfo>> {
        validate_block_id(block_id)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "block")
            .with_query("blockid", block_id)
            .with_optional_header("x-ms-lease-id", lease_id)?
            .with_body(data)
            .with_headers(self.encryption_headers(OperationKind::StageBlock)?);
        let request = self.with_transactional_md5(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlockStagedInfo::from_response(&raw)))
    }

    /// Stages a block whose content the service reads from `source_url`.
    ///
    /// The source URL is forwarded as given; it must carry its own
    /// authorization (usually a SAS).
    pub async fn stage_block_from_uri(
        &self,
        block_id: &str,
        source_url: &str,
        source_range: Option<HttpRange>,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<BlockStagedInfo>> {
        validate_block_id(block_id)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "block")
            .with_query("blockid", block_id)
            .with_header("x-ms-copy-source", source_url)?
            .with_optional_header("x-ms-source-range", source_range.map(|r| r.to_string()))?
            .with_optional_header("x-ms-lease-id", lease_id)?
            .with_headers(self.encryption_headers(OperationKind::StageBlockFromUri)?);

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlockStagedInfo::from_response(&raw)))
    }

    /// Writes the blob from a list of staged or committed blocks.
    pub async fn commit_block_list(
        &self,
        blocks: &[(BlockType, String)],
        options: &UploadBlobOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        validate_block_ids(blocks.iter().map(|(_, id)| id.as_str()))?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "blocklist")
            .with_header("content-type", "application/xml")?
            .with_body(serialize_block_list(blocks))
            .with_headers(self.encryption_headers(OperationKind::CommitBlockList)?);
        let request = self.with_transactional_md5(options.apply(request)?)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    pub async fn get_block_list(
        &self,
        list_type: BlockListType,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlockList>> {
        let request = StorageRequest::get(self.url()?)
            .with_query("comp", "blocklist")
            .with_query("blocklisttype", list_type.as_str())
            .with_headers(self.encryption_headers(OperationKind::GetBlockList)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        let list = parse_block_list(raw.body_str()?)?;
        Ok(Response::from_raw(&raw, list))
    }
}

impl ResourceClient for BlockBlobClient {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl BlobOperations for BlockBlobClient {
    fn with_identity(&self, identity: ResourceIdentity) -> Self {
        Self::from_parts(identity, Arc::clone(&self.pipeline))
    }
}

impl LeaseOperations for BlockBlobClient {
    fn lease_request(&self) -> StorageResult<StorageRequest> {
        Ok(StorageRequest::put(self.url()?).with_query("comp", "lease"))
    }
}

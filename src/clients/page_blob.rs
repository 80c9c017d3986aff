use bytes::Bytes;
use std::sync::Arc;

use super::{
    conditions_or_default, BlobOperations, LeaseOperations, ResourceClient, ResourceIdentity,
    UploadBlobOptions,
};
use crate::encryption::OperationKind;
use crate::error::{StorageError, StorageResult};
use crate::models::{validate_page_range, BlobContentInfo, PageList, PAGE_SIZE};
use crate::pipeline::Pipeline;
use crate::request::{AccessConditions, HttpRange, StorageRequest};
use crate::response::Response;
use crate::xml::parse_page_list;

/// Client for page blobs. Offsets and lengths are multiples of 512 bytes.
#[derive(Debug, Clone)]
pub struct PageBlobClient {
    identity: ResourceIdentity,
    pipeline: Arc<Pipeline>,
}

fn validate_blob_size(size: u64) -> StorageResult<()> {
    if size % PAGE_SIZE != 0 {
        return Err(StorageError::invalid_argument(format!(
            "page blob size {} is not a multiple of {}",
            size, PAGE_SIZE
        )));
    }
    Ok(())
}

impl PageBlobClient {
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

    /// Creates a zero-filled page blob of `size` bytes.
    pub async fn create(
        &self,
        size: u64,
        options: &UploadBlobOptions,
    ) -> StorageResult<Response<BlobContentInfo>> {
        validate_blob_size(size)?;
        let request = StorageRequest::put(self.url()?)
            .with_header("x-ms-blob-type", "PageBlob")?
            .with_header("x-ms-blob-content-length", size.to_string())?
            .with_headers(self.encryption_headers(OperationKind::CreatePageBlob)?);
        let request = options.apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Grows or shrinks the blob. Pages past the new end are discarded.
    pub async fn resize(
        &self,
        size: u64,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobContentInfo>> {
        validate_blob_size(size)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "properties")
            .with_header("x-ms-blob-content-length", size.to_string())?
            .with_headers(self.encryption_headers(OperationKind::Resize)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Writes `data` at `offset`.
    pub async fn upload_pages(
        &self,
        offset: u64,
        data: impl Into<Bytes>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let data = data.into();
        let length = data.len() as u64;
        validate_page_range(offset, length)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "page")
            .with_header("x-ms-page-write", "update")?
            .with_header("x-ms-range", HttpRange::new(offset, length).to_string())?
            .with_body(data)
            .with_headers(self.encryption_headers(OperationKind::UploadPages)?);
        let request = conditions_or_default(conditions).apply(request)?;
        let request = self.with_transactional_md5(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Zeroes `length` bytes at `offset`.
    pub async fn clear_pages(
        &self,
        offset: u64,
        length: u64,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobContentInfo>> {
        validate_page_range(offset, length)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "page")
            .with_header("x-ms-page-write", "clear")?
            .with_header("x-ms-range", HttpRange::new(offset, length).to_string())?
            .with_headers(self.encryption_headers(OperationKind::ClearPages)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Writes pages the service reads from `source_url`.
    pub async fn upload_pages_from_uri(
        &self,
        source_url: &str,
        source_offset: u64,
        offset: u64,
        length: u64,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobContentInfo>> {
        validate_page_range(offset, length)?;
        validate_page_range(source_offset, length)?;
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "page")
            .with_header("x-ms-page-write", "update")?
            .with_header("x-ms-copy-source", source_url)?
            .with_header(
                "x-ms-source-range",
                HttpRange::new(source_offset, length).to_string(),
            )?
            .with_header("x-ms-range", HttpRange::new(offset, length).to_string())?
            .with_headers(self.encryption_headers(OperationKind::UploadPagesFromUri)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    /// Returns the valid page ranges, optionally limited to `range`.
    pub async fn get_page_ranges(
        &self,
        range: Option<HttpRange>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<PageList>> {
        let request = StorageRequest::get(self.url()?)
            .with_query("comp", "pagelist")
            .with_optional_header("x-ms-range", range.map(|r| r.to_string()))?
            .with_headers(self.encryption_headers(OperationKind::GetPageRanges)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        let list = parse_page_list(raw.body_str()?)?;
        Ok(Response::from_raw(&raw, list))
    }
}

impl ResourceClient for PageBlobClient {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl BlobOperations for PageBlobClient {
    fn with_identity(&self, identity: ResourceIdentity) -> Self {
        Self::from_parts(identity, Arc::clone(&self.pipeline))
    }
}

impl LeaseOperations for PageBlobClient {
    fn lease_request(&self) -> StorageResult<StorageRequest> {
        Ok(StorageRequest::put(self.url()?).with_query("comp", "lease"))
    }
}

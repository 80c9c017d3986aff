use std::collections::HashMap;
use std::sync::Arc;

use super::{
    conditions_or_default, AppendBlobClient, BlobClient, BlockBlobClient, LeaseOperations,
    PageBlobClient, ResourceClient, ResourceIdentity,
};
use crate::config::ClientOptions;
use crate::encryption::{EncryptionContext, OperationKind};
use crate::error::{StorageError, StorageResult};
use crate::listing::{self, BlobLister, ListBlobsOptions, ListingMode, ListingPage};
use crate::models::{
    ContainerAccessPolicy, ContainerProperties, CreateContainerOptions, PublicAccessLevel,
    ResourceInfo,
};
use crate::pipeline::Pipeline;
use crate::request::{AccessConditions, StorageRequest};
use crate::response::Response;
use crate::xml::{parse_signed_identifiers, serialize_signed_identifiers};

/// Client for a container and the blobs inside it.
#[derive(Debug, Clone)]
pub struct ContainerClient {
    identity: ResourceIdentity,
    pipeline: Arc<Pipeline>,
}

impl ContainerClient {
    pub fn new(pipeline: Arc<Pipeline>, container: impl Into<String>) -> StorageResult<Self> {
        let identity = ResourceIdentity::container(pipeline.endpoint().clone(), container)?;
        Ok(Self { identity, pipeline })
    }

    pub fn from_connection_string(
        connection_string: &str,
        container: impl Into<String>,
        options: ClientOptions,
    ) -> StorageResult<Self> {
        options.encryption.validate()?;
        let pipeline = Pipeline::from_connection_string(connection_string, options)?;
        Self::new(Arc::new(pipeline), container)
    }

    /// Same container, sending requests under another encryption context.
    pub fn with_encryption(&self, encryption: EncryptionContext) -> StorageResult<Self> {
        encryption.validate()?;
        let options = self.pipeline.options().clone().with_encryption(encryption);
        Ok(Self {
            identity: self.identity.clone(),
            pipeline: Arc::new(self.pipeline.with_options(options)),
        })
    }

    pub fn name(&self) -> &str {
        self.identity.container_name()
    }

    fn container_request(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        Ok(request
            .with_query("restype", "container")
            .with_headers(self.encryption_headers(OperationKind::ContainerOperation)?))
    }

    pub async fn create(
        &self,
        options: &CreateContainerOptions,
    ) -> StorageResult<Response<ResourceInfo>> {
        if options.prevent_encryption_scope_override && options.default_encryption_scope.is_none()
        {
            return Err(StorageError::invalid_argument(
                "preventing scope override requires a default encryption scope",
            ));
        }

        let public_access = match options.public_access {
            PublicAccessLevel::None => None,
            level => Some(level.as_str()),
        };
        let request = self
            .container_request(StorageRequest::put(self.url()?))?
            .with_metadata(&options.metadata)?
            .with_optional_header("x-ms-blob-public-access", public_access)?
            .with_optional_header(
                "x-ms-default-encryption-scope",
                options.default_encryption_scope.as_deref(),
            )?
            .with_optional_header(
                "x-ms-deny-encryption-scope-override",
                options
                    .default_encryption_scope
                    .as_ref()
                    .map(|_| options.prevent_encryption_scope_override.to_string()),
            )?;

        let raw = self.pipeline.send(request).await?;
        tracing::debug!(container = self.name(), "container created");
        Ok(Response::from_raw(&raw, ResourceInfo::from_response(&raw)?))
    }

    pub async fn delete(
        &self,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<()>> {
        let request = self.container_request(StorageRequest::delete(self.url()?))?;
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, ()))
    }

    pub async fn get_properties(
        &self,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<ContainerProperties>> {
        let request = self
            .container_request(StorageRequest::get(self.url()?))?
            .with_optional_header("x-ms-lease-id", lease_id)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, ContainerProperties::from_response(&raw)?))
    }

    pub async fn set_metadata(
        &self,
        metadata: &HashMap<String, String>,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<ResourceInfo>> {
        let request = self
            .container_request(StorageRequest::put(self.url()?))?
            .with_query("comp", "metadata")
            .with_metadata(metadata)?
            .with_optional_header("x-ms-lease-id", lease_id)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, ResourceInfo::from_response(&raw)?))
    }

    pub async fn get_access_policy(
        &self,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<ContainerAccessPolicy>> {
        let request = self
            .container_request(StorageRequest::get(self.url()?))?
            .with_query("comp", "acl")
            .with_optional_header("x-ms-lease-id", lease_id)?;

        let raw = self.pipeline.send(request).await?;
        let body = raw.body_str()?;
        let signed_identifiers = if body.trim().is_empty() {
            Vec::new()
        } else {
            parse_signed_identifiers(body)?
        };
        let policy = ContainerAccessPolicy {
            public_access: raw
                .header("x-ms-blob-public-access")
                .and_then(PublicAccessLevel::from_str)
                .unwrap_or_default(),
            signed_identifiers,
        };
        Ok(Response::from_raw(&raw, policy))
    }

    /// Replaces the public access level and every stored access policy.
    pub async fn set_access_policy(
        &self,
        policy: &ContainerAccessPolicy,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<ResourceInfo>> {
        let public_access = match policy.public_access {
            PublicAccessLevel::None => None,
            level => Some(level.as_str()),
        };
        let request = self
            .container_request(StorageRequest::put(self.url()?))?
            .with_query("comp", "acl")
            .with_optional_header("x-ms-blob-public-access", public_access)?
            .with_header("content-type", "application/xml")?
            .with_body(serialize_signed_identifiers(&policy.signed_identifiers));
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline.send(request).await?;
        Ok(Response::from_raw(&raw, ResourceInfo::from_response(&raw)?))
    }

    /// Fetches one flat page starting at `options.marker`.
    pub async fn list_blobs_flat_page(
        &self,
        options: &ListBlobsOptions,
    ) -> StorageResult<Response<ListingPage>> {
        listing::fetch_page(
            &self.pipeline,
            StorageRequest::get(self.url()?),
            &ListingMode::Flat,
            options,
            options.marker.as_deref(),
        )
        .await
    }

    /// Fetches one hierarchical page starting at `options.marker`.
    pub async fn list_blobs_by_hierarchy_page(
        &self,
        delimiter: &str,
        options: &ListBlobsOptions,
    ) -> StorageResult<Response<ListingPage>> {
        let mode = ListingMode::Hierarchy {
            delimiter: delimiter.to_string(),
        };
        listing::fetch_page(
            &self.pipeline,
            StorageRequest::get(self.url()?),
            &mode,
            options,
            options.marker.as_deref(),
        )
        .await
    }

    /// Returns a cursor over every page of the listing.
    pub fn list_blobs(
        &self,
        mode: ListingMode,
        options: ListBlobsOptions,
    ) -> StorageResult<BlobLister> {
        Ok(BlobLister::new(
            Arc::clone(&self.pipeline),
            self.url()?,
            mode,
            options,
        ))
    }

    pub fn blob_client(&self, name: impl Into<String>) -> StorageResult<BlobClient> {
        Ok(BlobClient::from_parts(
            self.blob_identity(name)?,
            Arc::clone(&self.pipeline),
        ))
    }

    pub fn block_blob_client(&self, name: impl Into<String>) -> StorageResult<BlockBlobClient> {
        Ok(BlockBlobClient::from_parts(
            self.blob_identity(name)?,
            Arc::clone(&self.pipeline),
        ))
    }

    pub fn append_blob_client(&self, name: impl Into<String>) -> StorageResult<AppendBlobClient> {
        Ok(AppendBlobClient::from_parts(
            self.blob_identity(name)?,
            Arc::clone(&self.pipeline),
        ))
    }

    pub fn page_blob_client(&self, name: impl Into<String>) -> StorageResult<PageBlobClient> {
        Ok(PageBlobClient::from_parts(
            self.blob_identity(name)?,
            Arc::clone(&self.pipeline),
        ))
    }

    fn blob_identity(&self, name: impl Into<String>) -> StorageResult<ResourceIdentity> {
        ResourceIdentity::blob(
            self.identity.endpoint().clone(),
            self.identity.container_name(),
            name,
        )
    }
}

impl ResourceClient for ContainerClient {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl LeaseOperations for ContainerClient {
    fn lease_request(&self) -> StorageResult<StorageRequest> {
        Ok(StorageRequest::put(self.url()?)
            .with_query("restype", "container")
            .with_query("comp", "lease"))
    }
}

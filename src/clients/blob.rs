use std::sync::Arc;
use url::Url;

use super::{
    AppendBlobClient, BlobOperations, BlockBlobClient, LeaseOperations, PageBlobClient,
    ResourceClient, ResourceIdentity,
};
use crate::auth::StorageCredential;
use crate::config::ClientOptions;
use crate::error::{StorageError, StorageResult};
use crate::pipeline::Pipeline;
use crate::request::StorageRequest;

/// Client for operations that do not depend on the blob kind.
#[derive(Debug, Clone)]
pub struct BlobClient {
    identity: ResourceIdentity,
    pipeline: Arc<Pipeline>,
}

impl BlobClient {
    pub fn new(
        pipeline: Arc<Pipeline>,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> StorageResult<Self> {
        let identity = ResourceIdentity::blob(pipeline.endpoint().clone(), container, blob)?;
        Ok(Self { identity, pipeline })
    }

    pub fn from_connection_string(
        connection_string: &str,
        container: impl Into<String>,
        blob: impl Into<String>,
        options: ClientOptions,
    ) -> StorageResult<Self> {
        options.encryption.validate()?;
        let pipeline = Pipeline::from_connection_string(connection_string, options)?;
        Self::new(Arc::new(pipeline), container, blob)
    }

    /// Builds a client from a blob URL. A SAS in the query becomes the
    /// credential; without one the client is anonymous.
    pub fn from_url(url: &str, options: ClientOptions) -> StorageResult<Self> {
        let url = Url::parse(url).map_err(|e| {
            StorageError::invalid_argument(format!("invalid blob URL '{}'", url)).with_source(e)
        })?;
        options.encryption.validate()?;
        let (identity, query) = ResourceIdentity::from_blob_url(&url)?;
        let credential = match query {
            Some(sas) => StorageCredential::SasToken(sas),
            None => StorageCredential::Anonymous,
        };
        let pipeline = Pipeline::new(identity.endpoint().clone(), credential, options);
        Ok(Self::from_parts(identity, Arc::new(pipeline)))
    }

    pub(crate) fn from_parts(identity: ResourceIdentity, pipeline: Arc<Pipeline>) -> Self {
        Self { identity, pipeline }
    }

    pub fn as_block_blob_client(&self) -> BlockBlobClient {
        BlockBlobClient::from_parts(self.identity.clone(), Arc::clone(&self.pipeline))
    }

    pub fn as_append_blob_client(&self) -> AppendBlobClient {
        AppendBlobClient::from_parts(self.identity.clone(), Arc::clone(&self.pipeline))
    }

    pub fn as_page_blob_client(&self) -> PageBlobClient {
        PageBlobClient::from_parts(self.identity.clone(), Arc::clone(&self.pipeline))
    }
}

impl ResourceClient for BlobClient {
    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl BlobOperations for BlobClient {
    fn with_identity(&self, identity: ResourceIdentity) -> Self {
        Self::from_parts(identity, Arc::clone(&self.pipeline))
    }
}

impl LeaseOperations for BlobClient {
    fn lease_request(&self) -> StorageResult<StorageRequest> {
        Ok(StorageRequest::put(self.url()?).with_query("comp", "lease"))
    }
}

//! Resource clients: containers and the three blob kinds.
//!
//! Clients are cheap to clone. They share one [`Pipeline`] and hold no
//! mutable state; lease ids, markers and ETags flow through parameters and
//! results.

mod append_blob;
mod blob;
mod block_blob;
mod container;
mod page_blob;

pub use append_blob::*;
pub use blob::*;
pub use block_blob::*;
pub use container::*;
pub use page_blob::*;

use async_trait::async_trait;
use http::HeaderMap;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::encryption::{self, EncryptionContext, OperationKind};
use crate::error::{StorageError, StorageResult};
use crate::lease::{BrokenLease, LeaseAction, LeaseDuration, LeaseInfo};
use crate::models::{
    AccessTier, BlobContentInfo, BlobHttpHeaders, BlobProperties, DeleteSnapshots,
    DownloadResult, ResourceInfo, SnapshotInfo,
};
use crate::pipeline::Pipeline;
use crate::request::{AccessConditions, HttpRange, StorageRequest};
use crate::response::Response;

/// Maximum blob name length.
pub const MAX_BLOB_NAME_LENGTH: usize = 1024;

/// Where a client points. Fixed when the client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    endpoint: Url,
    container: String,
    blob: Option<String>,
    snapshot: Option<String>,
    version_id: Option<String>,
}

impl ResourceIdentity {
    pub fn container(endpoint: Url, container: impl Into<String>) -> StorageResult<Self> {
        let container = container.into();
        validate_container_name(&container)?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::invalid_argument(format!(
                "endpoint '{}' cannot hold a path",
                endpoint
            )));
        }
        Ok(Self {
            endpoint,
            container,
            blob: None,
            snapshot: None,
            version_id: None,
        })
    }

    pub fn blob(
        endpoint: Url,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> StorageResult<Self> {
        let blob = blob.into();
        validate_blob_name(&blob)?;
        let mut identity = Self::container(endpoint, container)?;
        identity.blob = Some(blob);
        Ok(identity)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Splits an absolute blob URL into an identity and its remaining query.
    ///
    /// Hosts that are IP addresses or `localhost` use path-style addressing,
    /// where the first path segment is the account. `snapshot` and
    /// `versionid` move into the identity; every other parameter (usually a
    /// SAS) is returned as-is.
    pub fn from_blob_url(url: &Url) -> StorageResult<(Self, Option<String>)> {
        let invalid = || StorageError::invalid_argument(format!("'{}' is not a blob URL", url));
        let segments: Vec<String> = url
            .path_segments()
            .ok_or_else(invalid)?
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();

        let path_style = matches!(url.host(), Some(url::Host::Ipv4(_) | url::Host::Ipv6(_)))
            || url.host_str() == Some("localhost");
        let skip = usize::from(path_style);
        if segments.len() < skip + 2 {
            return Err(invalid());
        }

        let mut endpoint = url.clone();
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        endpoint.set_path(&segments[..skip].join("/"));

        let mut identity = Self::blob(
            endpoint,
            segments[skip].as_str(),
            segments[skip + 1..].join("/"),
        )?;
        let mut rest = url::form_urlencoded::Serializer::new(String::new());
        let mut has_rest = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "snapshot" => identity = identity.with_snapshot(value.into_owned()),
                "versionid" => identity = identity.with_version_id(value.into_owned()),
                _ => {
                    rest.append_pair(&key, &value);
                    has_rest = true;
                }
            }
        }
        Ok((identity, has_rest.then(|| rest.finish())))
    }

    pub fn container_name(&self) -> &str {
        &self.container
    }

    pub fn blob_name(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    /// Same resource, addressed at a snapshot. Clears any version id.
    pub fn with_snapshot(&self, snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            version_id: None,
            ..self.clone()
        }
    }

    /// Same resource, addressed at a version. Clears any snapshot.
    pub fn with_version_id(&self, version_id: impl Into<String>) -> Self {
        Self {
            snapshot: None,
            version_id: Some(version_id.into()),
            ..self.clone()
        }
    }

    /// Builds the resource URL, including `snapshot` / `versionid`.
    pub fn url(&self) -> StorageResult<Url> {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::invalid_argument(format!(
                    "endpoint '{}' cannot hold a path",
                    self.endpoint
                ))
            })?;
            segments.pop_if_empty().push(&self.container);
            if let Some(blob) = &self.blob {
                segments.extend(blob.split('/'));
            }
        }
        if let Some(snapshot) = &self.snapshot {
            url.query_pairs_mut().append_pair("snapshot", snapshot);
        }
        if let Some(version_id) = &self.version_id {
            url.query_pairs_mut().append_pair("versionid", version_id);
        }
        Ok(url)
    }
}

/// Checks container naming rules.
pub fn validate_container_name(name: &str) -> StorageResult<()> {
    if matches!(name, "$root" | "$logs" | "$web") {
        return Ok(());
    }
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let valid = (3..=63).contains(&name.len())
        && valid_chars
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if !valid {
        return Err(StorageError::invalid_argument(format!(
            "invalid container name '{}'",
            name
        )));
    }
    Ok(())
}

/// Checks blob naming rules.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::invalid_argument("blob name must not be empty"));
    }
    if name.chars().count() > MAX_BLOB_NAME_LENGTH {
        return Err(StorageError::invalid_argument(format!(
            "blob name exceeds {} characters",
            MAX_BLOB_NAME_LENGTH
        )));
    }
    Ok(())
}

/// Behavior shared by every resource client.
pub trait ResourceClient: Send + Sync {
    fn identity(&self) -> &ResourceIdentity;

    fn pipeline(&self) -> &Arc<Pipeline>;

    fn encryption(&self) -> &EncryptionContext {
        &self.pipeline().options().encryption
    }

    fn url(&self) -> StorageResult<Url> {
        self.identity().url()
    }

    /// Encryption headers for `operation` under this client's context.
    fn encryption_headers(&self, operation: OperationKind) -> StorageResult<HeaderMap> {
        encryption::resolve(self.encryption(), operation)
    }

    /// Adds `Content-MD5` when transactional MD5 is enabled.
    fn with_transactional_md5(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        if self.pipeline().options().transactional_md5 {
            request.with_content_md5()
        } else {
            Ok(request)
        }
    }
}

/// Properties set when blob content is created or committed.
#[derive(Debug, Clone, Default)]
pub struct UploadBlobOptions {
    pub http_headers: BlobHttpHeaders,
    pub metadata: HashMap<String, String>,
    /// Block blobs only.
    pub access_tier: Option<AccessTier>,
    pub conditions: AccessConditions,
}

impl UploadBlobOptions {
    pub(crate) fn apply(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        let request = self
            .http_headers
            .apply(request)?
            .with_metadata(&self.metadata)?
            .with_optional_header("x-ms-access-tier", self.access_tier.map(|t| t.as_str()))?;
        self.conditions.apply(request)
    }
}

fn conditions_or_default(conditions: Option<&AccessConditions>) -> AccessConditions {
    conditions.cloned().unwrap_or_default()
}

/// Operations every blob kind supports.
#[async_trait]
pub trait BlobOperations: ResourceClient {
    /// Returns a client of the same kind pointing at another identity.
    fn with_identity(&self, identity: ResourceIdentity) -> Self
    where
        Self: Sized;

    fn with_snapshot(&self, snapshot: &str) -> Self
    where
        Self: Sized,
    {
        self.with_identity(self.identity().with_snapshot(snapshot))
    }

    fn with_version_id(&self, version_id: &str) -> Self
    where
        Self: Sized,
    {
        self.with_identity(self.identity().with_version_id(version_id))
    }

    async fn get_properties(
        &self,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobProperties>> {
        let request = StorageRequest::head(self.url()?)
            .with_headers(self.encryption_headers(OperationKind::GetProperties)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, BlobProperties::from_response(&raw)?))
    }

    async fn set_metadata(
        &self,
        metadata: &HashMap<String, String>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<BlobContentInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "metadata")
            .with_metadata(metadata)?
            .with_headers(self.encryption_headers(OperationKind::SetMetadata)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, BlobContentInfo::from_response(&raw)?))
    }

    async fn set_http_headers(
        &self,
        headers: &BlobHttpHeaders,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<ResourceInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "properties")
            .with_headers(self.encryption_headers(OperationKind::SetHttpHeaders)?);
        let request = headers.apply(request)?;
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, ResourceInfo::from_response(&raw)?))
    }

    async fn create_snapshot(
        &self,
        metadata: &HashMap<String, String>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<SnapshotInfo>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "snapshot")
            .with_metadata(metadata)?
            .with_headers(self.encryption_headers(OperationKind::CreateSnapshot)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, SnapshotInfo::from_response(&raw)?))
    }

    /// Deletes the blob. Snapshots must be included when the blob has any.
    async fn delete(
        &self,
        delete_snapshots: Option<DeleteSnapshots>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<()>> {
        let request = StorageRequest::delete(self.url()?)
            .with_optional_header("x-ms-delete-snapshots", delete_snapshots.map(|d| d.as_str()))?
            .with_headers(self.encryption_headers(OperationKind::Delete)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, ()))
    }

    async fn download(
        &self,
        range: Option<HttpRange>,
        conditions: Option<&AccessConditions>,
    ) -> StorageResult<Response<DownloadResult>> {
        let request = StorageRequest::get(self.url()?)
            .with_optional_header("x-ms-range", range.map(|r| r.to_string()))?
            .with_headers(self.encryption_headers(OperationKind::Download)?);
        let request = conditions_or_default(conditions).apply(request)?;

        let raw = self.pipeline().send(request).await?;
        let result = DownloadResult {
            content: raw.body.clone(),
            content_range: raw.header("content-range").map(str::to_string),
            properties: BlobProperties::from_response(&raw)?,
        };
        Ok(Response::from_raw(&raw, result))
    }

    async fn set_access_tier(
        &self,
        tier: AccessTier,
        lease_id: Option<&str>,
    ) -> StorageResult<Response<()>> {
        let request = StorageRequest::put(self.url()?)
            .with_query("comp", "tier")
            .with_header("x-ms-access-tier", tier.as_str())?
            .with_optional_header("x-ms-lease-id", lease_id)?
            .with_headers(self.encryption_headers(OperationKind::SetAccessTier)?);

        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, ()))
    }
}

/// Lease operations, shared by containers and blobs.
#[async_trait]
pub trait LeaseOperations: ResourceClient {
    /// A PUT addressed at this resource's lease endpoint.
    fn lease_request(&self) -> StorageResult<StorageRequest>;

    async fn acquire_lease(
        &self,
        duration: LeaseDuration,
        proposed_id: Option<&str>,
    ) -> StorageResult<Response<LeaseInfo>> {
        let action = LeaseAction::Acquire {
            proposed_id: proposed_id.map(str::to_string),
            duration,
        };
        send_lease(self, action).await
    }

    async fn renew_lease(&self, lease_id: &str) -> StorageResult<Response<LeaseInfo>> {
        let action = LeaseAction::Renew {
            lease_id: lease_id.to_string(),
        };
        send_lease(self, action).await
    }

    async fn change_lease(
        &self,
        lease_id: &str,
        proposed_id: &str,
    ) -> StorageResult<Response<LeaseInfo>> {
        let action = LeaseAction::Change {
            lease_id: lease_id.to_string(),
            proposed_id: proposed_id.to_string(),
        };
        send_lease(self, action).await
    }

    async fn release_lease(&self, lease_id: &str) -> StorageResult<Response<LeaseInfo>> {
        let action = LeaseAction::Release {
            lease_id: lease_id.to_string(),
        };
        send_lease(self, action).await
    }

    async fn break_lease(&self, period: Option<u32>) -> StorageResult<Response<BrokenLease>> {
        let request = LeaseAction::Break { period }.apply(self.lease_request()?)?;
        let raw = self.pipeline().send(request).await?;
        Ok(Response::from_raw(&raw, BrokenLease::from_response(&raw)?))
    }
}

async fn send_lease<C>(client: &C, action: LeaseAction) -> StorageResult<Response<LeaseInfo>>
where
    C: LeaseOperations + ?Sized,
{
    let request = action
        .apply(client.lease_request()?)?
        .with_headers(client.encryption_headers(OperationKind::Lease)?);
    tracing::debug!(action = action.kind().as_str(), "lease request");

    let raw = client.pipeline().send(request).await?;
    Ok(Response::from_raw(&raw, LeaseInfo::from_response(&raw)?))
}

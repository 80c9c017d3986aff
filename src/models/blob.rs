//! Blob data models.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::StorageResult;
use crate::request::{parse_http_date, StorageRequest};
use crate::response::RawResponse;

/// Blob types supported by Azure Blob Storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobType {
    BlockBlob,
    PageBlob,
    AppendBlob,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::BlockBlob => "BlockBlob",
            BlobType::PageBlob => "PageBlob",
            BlobType::AppendBlob => "AppendBlob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BlockBlob" => Some(BlobType::BlockBlob),
            "PageBlob" => Some(BlobType::PageBlob),
            "AppendBlob" => Some(BlobType::AppendBlob),
            _ => None,
        }
    }
}

/// Access tiers for blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Hot,
    Cool,
    Cold,
    Archive,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "Hot",
            AccessTier::Cool => "Cool",
            AccessTier::Cold => "Cold",
            AccessTier::Archive => "Archive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hot" => Some(AccessTier::Hot),
            "cool" => Some(AccessTier::Cool),
            "cold" => Some(AccessTier::Cold),
            "archive" => Some(AccessTier::Archive),
            _ => None,
        }
    }
}

/// Lease state for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseState {
    #[default]
    Available,
    Leased,
    Expired,
    Breaking,
    Broken,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Available => "available",
            LeaseState::Leased => "leased",
            LeaseState::Expired => "expired",
            LeaseState::Breaking => "breaking",
            LeaseState::Broken => "broken",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(LeaseState::Available),
            "leased" => Some(LeaseState::Leased),
            "expired" => Some(LeaseState::Expired),
            "breaking" => Some(LeaseState::Breaking),
            "broken" => Some(LeaseState::Broken),
            _ => None,
        }
    }
}

/// Lease status for containers and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseStatus {
    #[default]
    Unlocked,
    Locked,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Unlocked => "unlocked",
            LeaseStatus::Locked => "locked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unlocked" => Some(LeaseStatus::Unlocked),
            "locked" => Some(LeaseStatus::Locked),
            _ => None,
        }
    }
}

/// Whether a held lease has a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDurationType {
    Infinite,
    Fixed,
}

impl LeaseDurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseDurationType::Infinite => "infinite",
            LeaseDurationType::Fixed => "fixed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "infinite" => Some(LeaseDurationType::Infinite),
            "fixed" => Some(LeaseDurationType::Fixed),
            _ => None,
        }
    }
}

/// How `delete` treats snapshots of the base blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSnapshots {
    /// Delete the base blob and all of its snapshots.
    Include,
    /// Delete only the snapshots.
    Only,
}

impl DeleteSnapshots {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteSnapshots::Include => "include",
            DeleteSnapshots::Only => "only",
        }
    }
}

/// Standard HTTP properties stored with a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobHttpHeaders {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_md5: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

impl BlobHttpHeaders {
    /// Sets the `x-ms-blob-*` headers that carry these properties.
    pub(crate) fn apply(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        request
            .with_optional_header("x-ms-blob-content-type", self.content_type.as_deref())?
            .with_optional_header("x-ms-blob-content-encoding", self.content_encoding.as_deref())?
            .with_optional_header("x-ms-blob-content-language", self.content_language.as_deref())?
            .with_optional_header("x-ms-blob-content-md5", self.content_md5.as_deref())?
            .with_optional_header(
                "x-ms-blob-content-disposition",
                self.content_disposition.as_deref(),
            )?
            .with_optional_header("x-ms-blob-cache-control", self.cache_control.as_deref())
    }
}

/// A blob entry returned by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobItem {
    pub name: String,
    pub deleted: bool,
    pub snapshot: Option<String>,
    /// Absent when the service did not report a version; never an empty string.
    pub version_id: Option<String>,
    pub is_current_version: Option<bool>,
    /// Present only when metadata was requested.
    pub metadata: Option<HashMap<String, String>>,
    pub created_on: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub blob_type: Option<BlobType>,
    pub access_tier: Option<AccessTier>,
    pub lease_state: Option<LeaseState>,
    pub lease_status: Option<LeaseStatus>,
    pub server_encrypted: Option<bool>,
    pub encryption_scope: Option<String>,
    pub encryption_key_sha256: Option<String>,
}

/// Properties returned by a HEAD on a blob.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobProperties {
    pub blob_type: Option<BlobType>,
    pub created_on: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub content_length: u64,
    pub http_headers: BlobHttpHeaders,
    pub metadata: HashMap<String, String>,
    pub access_tier: Option<AccessTier>,
    pub lease_state: Option<LeaseState>,
    pub lease_status: Option<LeaseStatus>,
    pub lease_duration: Option<LeaseDurationType>,
    pub server_encrypted: bool,
    pub encryption_key_sha256: Option<String>,
    pub encryption_scope: Option<String>,
    pub version_id: Option<String>,
    pub is_current_version: Option<bool>,
    /// Page blobs only.
    pub sequence_number: Option<u64>,
    /// Append blobs only.
    pub committed_block_count: Option<u32>,
}

impl BlobProperties {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            blob_type: raw.header("x-ms-blob-type").and_then(BlobType::from_str),
            created_on: raw.header("x-ms-creation-time").and_then(parse_http_date),
            last_modified: raw.last_modified()?,
            etag: raw.etag()?,
            content_length: raw.parse_header("content-length").unwrap_or(0),
            http_headers: BlobHttpHeaders {
                content_type: raw.header("content-type").map(str::to_string),
                content_encoding: raw.header("content-encoding").map(str::to_string),
                content_language: raw.header("content-language").map(str::to_string),
                content_md5: raw.header("content-md5").map(str::to_string),
                content_disposition: raw.header("content-disposition").map(str::to_string),
                cache_control: raw.header("cache-control").map(str::to_string),
            },
            metadata: raw.metadata(),
            access_tier: raw.header("x-ms-access-tier").and_then(AccessTier::from_str),
            lease_state: raw.header("x-ms-lease-state").and_then(LeaseState::from_str),
            lease_status: raw.header("x-ms-lease-status").and_then(LeaseStatus::from_str),
            lease_duration: raw
                .header("x-ms-lease-duration")
                .and_then(LeaseDurationType::from_str),
            server_encrypted: raw.parse_header("x-ms-server-encrypted").unwrap_or(false),
            encryption_key_sha256: raw
                .header("x-ms-encryption-key-sha256")
                .map(str::to_string),
            encryption_scope: raw.header("x-ms-encryption-scope").map(str::to_string),
            version_id: raw.header("x-ms-version-id").map(str::to_string),
            is_current_version: raw.parse_header("x-ms-is-current-version"),
            sequence_number: raw.parse_header("x-ms-blob-sequence-number"),
            committed_block_count: raw.parse_header("x-ms-blob-committed-block-count"),
        })
    }
}

/// Result of an operation that writes blob content.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobContentInfo {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub version_id: Option<String>,
    pub content_md5: Option<String>,
    /// `x-ms-request-server-encrypted`, falling back to `x-ms-server-encrypted`.
    pub server_encrypted: Option<bool>,
    pub encryption_key_sha256: Option<String>,
    pub encryption_scope: Option<String>,
    /// Append blobs only.
    pub append_offset: Option<u64>,
    /// Append blobs only.
    pub committed_block_count: Option<u32>,
    /// Page blobs only.
    pub sequence_number: Option<u64>,
}

impl BlobContentInfo {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
            version_id: raw.header("x-ms-version-id").map(str::to_string),
            content_md5: raw.header("content-md5").map(str::to_string),
            server_encrypted: raw
                .parse_header("x-ms-request-server-encrypted")
                .or_else(|| raw.parse_header("x-ms-server-encrypted")),
            encryption_key_sha256: raw
                .header("x-ms-encryption-key-sha256")
                .map(str::to_string),
            encryption_scope: raw.header("x-ms-encryption-scope").map(str::to_string),
            append_offset: raw.parse_header("x-ms-blob-append-offset"),
            committed_block_count: raw.parse_header("x-ms-blob-committed-block-count"),
            sequence_number: raw.parse_header("x-ms-blob-sequence-number"),
        })
    }
}

/// ETag and last-modified of a resource after a property change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl ResourceInfo {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
        })
    }
}

/// Result of creating a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub snapshot: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub version_id: Option<String>,
    pub server_encrypted: Option<bool>,
}

impl SnapshotInfo {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            snapshot: raw.required_header("x-ms-snapshot")?.to_string(),
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
            version_id: raw.header("x-ms-version-id").map(str::to_string),
            server_encrypted: raw.parse_header("x-ms-request-server-encrypted"),
        })
    }
}

/// Downloaded content plus the blob's properties.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub content: Bytes,
    pub content_range: Option<String>,
    pub properties: BlobProperties,
}

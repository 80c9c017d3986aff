//! Container data models.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::blob::{LeaseDurationType, LeaseState, LeaseStatus};
use crate::error::StorageResult;
use crate::response::RawResponse;

/// Public access level for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicAccessLevel {
    #[default]
    None,
    Container,
    Blob,
}

impl PublicAccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccessLevel::None => "",
            PublicAccessLevel::Container => "container",
            PublicAccessLevel::Blob => "blob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" | "private" => Some(PublicAccessLevel::None),
            "container" => Some(PublicAccessLevel::Container),
            "blob" => Some(PublicAccessLevel::Blob),
            _ => None,
        }
    }
}

/// Options for creating a container.
#[derive(Debug, Clone, Default)]
pub struct CreateContainerOptions {
    pub metadata: HashMap<String, String>,
    pub public_access: PublicAccessLevel,
    /// Scope applied to blobs written without an explicit scope.
    pub default_encryption_scope: Option<String>,
    /// Reject writes that name a different scope.
    pub prevent_encryption_scope_override: bool,
}

/// Container properties from a HEAD on the container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerProperties {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub lease_state: Option<LeaseState>,
    pub lease_status: Option<LeaseStatus>,
    pub lease_duration: Option<LeaseDurationType>,
    pub public_access: PublicAccessLevel,
    pub has_immutability_policy: bool,
    pub has_legal_hold: bool,
    pub default_encryption_scope: Option<String>,
    pub prevent_encryption_scope_override: bool,
}

impl ContainerProperties {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
            metadata: raw.metadata(),
            lease_state: raw.header("x-ms-lease-state").and_then(LeaseState::from_str),
            lease_status: raw.header("x-ms-lease-status").and_then(LeaseStatus::from_str),
            lease_duration: raw
                .header("x-ms-lease-duration")
                .and_then(LeaseDurationType::from_str),
            public_access: raw
                .header("x-ms-blob-public-access")
                .and_then(PublicAccessLevel::from_str)
                .unwrap_or_default(),
            has_immutability_policy: raw
                .parse_header("x-ms-has-immutability-policy")
                .unwrap_or(false),
            has_legal_hold: raw.parse_header("x-ms-has-legal-hold").unwrap_or(false),
            default_encryption_scope: raw
                .header("x-ms-default-encryption-scope")
                .map(str::to_string),
            prevent_encryption_scope_override: raw
                .parse_header("x-ms-deny-encryption-scope-override")
                .unwrap_or(false),
        })
    }
}

/// Signed identifier for container access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIdentifier {
    pub id: String,
    pub access_policy: AccessPolicy,
}

/// Access policy for a signed identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub permission: String,
}

/// Public access level plus stored access policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAccessPolicy {
    pub public_access: PublicAccessLevel,
    pub signed_identifiers: Vec<SignedIdentifier>,
}

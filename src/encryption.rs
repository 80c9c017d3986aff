//! Server-side encryption context and per-operation header resolution.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{StorageError, StorageResult};

pub const ENCRYPTION_KEY: &str = "x-ms-encryption-key";
pub const ENCRYPTION_KEY_SHA256: &str = "x-ms-encryption-key-sha256";
pub const ENCRYPTION_ALGORITHM: &str = "x-ms-encryption-algorithm";
pub const ENCRYPTION_SCOPE: &str = "x-ms-encryption-scope";

/// Encryption algorithm for customer-provided keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    #[default]
    Aes256,
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256 => "AES256",
        }
    }
}

/// A customer-provided AES-256 key and its SHA-256 hash, both base64.
#[derive(Clone, PartialEq, Eq)]
pub struct CustomerProvidedKey {
    key: String,
    key_sha256: String,
    algorithm: EncryptionAlgorithm,
}

impl CustomerProvidedKey {
    /// Creates a key from base64 key and hash, rejecting a hash that is not
    /// the SHA-256 of the key.
    pub fn new(key: impl Into<String>, key_sha256: impl Into<String>) -> StorageResult<Self> {
        let cpk = Self {
            key: key.into(),
            key_sha256: key_sha256.into(),
            algorithm: EncryptionAlgorithm::Aes256,
        };
        cpk.verify()?;
        Ok(cpk)
    }

    /// Creates a key from raw key bytes, computing the hash.
    pub fn from_key_bytes(key: &[u8]) -> Self {
        Self {
            key: BASE64.encode(key),
            key_sha256: BASE64.encode(Sha256::digest(key)),
            algorithm: EncryptionAlgorithm::Aes256,
        }
    }

    pub fn key_sha256(&self) -> &str {
        &self.key_sha256
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Re-checks that the hash matches the key.
    pub fn verify(&self) -> StorageResult<()> {
        let raw = BASE64.decode(&self.key).map_err(|e| {
            StorageError::invalid_argument("encryption key is not valid base64").with_source(e)
        })?;
        if BASE64.encode(Sha256::digest(&raw)) != self.key_sha256 {
            return Err(StorageError::invalid_argument(
                "encryption key hash is not the SHA-256 of the key",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CustomerProvidedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerProvidedKey")
            .field("key", &"<redacted>")
            .field("key_sha256", &self.key_sha256)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Encryption applied by a client. Exactly one variant per client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EncryptionContext {
    #[default]
    None,
    CustomerProvidedKey(CustomerProvidedKey),
    Scope(String),
}

impl EncryptionContext {
    /// Validates the context before a client is built with it.
    pub fn validate(&self) -> StorageResult<()> {
        match self {
            EncryptionContext::None => Ok(()),
            EncryptionContext::CustomerProvidedKey(cpk) => cpk.verify(),
            EncryptionContext::Scope(name) if name.is_empty() => Err(
                StorageError::invalid_argument("encryption scope name must not be empty"),
            ),
            EncryptionContext::Scope(_) => Ok(()),
        }
    }
}

/// How an operation treats encryption headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    /// Creates blob content.
    Create,
    /// Writes content or metadata into an existing blob.
    Write,
    /// Reads content.
    Read,
    /// Reads properties and metadata.
    Metadata,
    /// Writes content copied from a source URI.
    CopySource,
    /// Enumerates blocks, pages or blobs.
    Listing,
    /// Changes state that is independent of the encrypted content.
    Control,
}

/// Every operation a resource client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Upload,
    CreateAppendBlob,
    CreatePageBlob,
    StageBlock,
    StageBlockFromUri,
    CommitBlockList,
    AppendBlock,
    AppendBlockFromUri,
    UploadPages,
    UploadPagesFromUri,
    ClearPages,
    Resize,
    SetMetadata,
    CreateSnapshot,
    Download,
    GetProperties,
    GetBlockList,
    GetPageRanges,
    ListBlobs,
    SetHttpHeaders,
    SetAccessTier,
    Delete,
    Lease,
    ContainerOperation,
}

impl OperationKind {
    pub fn category(&self) -> OperationCategory {
        match self {
            OperationKind::Upload
            | OperationKind::CreateAppendBlob
            | OperationKind::CreatePageBlob => OperationCategory::Create,
            OperationKind::StageBlock
            | OperationKind::CommitBlockList
            | OperationKind::AppendBlock
            | OperationKind::UploadPages
            | OperationKind::ClearPages
            | OperationKind::Resize
            | OperationKind::SetMetadata
            | OperationKind::CreateSnapshot => OperationCategory::Write,
            OperationKind::StageBlockFromUri
            | OperationKind::AppendBlockFromUri
            | OperationKind::UploadPagesFromUri => OperationCategory::CopySource,
            OperationKind::Download => OperationCategory::Read,
            OperationKind::GetProperties => OperationCategory::Metadata,
            OperationKind::GetBlockList
            | OperationKind::GetPageRanges
            | OperationKind::ListBlobs => OperationCategory::Listing,
            OperationKind::SetHttpHeaders
            | OperationKind::SetAccessTier
            | OperationKind::Delete
            | OperationKind::Lease
            | OperationKind::ContainerOperation => OperationCategory::Control,
        }
    }
}

/// Returns the encryption headers `context` requires for `operation`.
///
/// Never returns both customer-key and scope headers.
pub fn resolve(context: &EncryptionContext, operation: OperationKind) -> StorageResult<HeaderMap> {
    context.validate()?;
    let mut headers = HeaderMap::new();
    let category = operation.category();

    match context {
        EncryptionContext::None => {}
        EncryptionContext::CustomerProvidedKey(cpk) => {
            if matches!(
                category,
                OperationCategory::Create
                    | OperationCategory::Write
                    | OperationCategory::Read
                    | OperationCategory::Metadata
                    | OperationCategory::CopySource
            ) {
                insert(&mut headers, ENCRYPTION_KEY, &cpk.key)?;
                insert(&mut headers, ENCRYPTION_KEY_SHA256, &cpk.key_sha256)?;
                insert(&mut headers, ENCRYPTION_ALGORITHM, cpk.algorithm.as_str())?;
            }
        }
        EncryptionContext::Scope(scope) => {
            if matches!(
                category,
                OperationCategory::Create | OperationCategory::Write | OperationCategory::CopySource
            ) {
                insert(&mut headers, ENCRYPTION_SCOPE, scope)?;
            }
        }
    }

    Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> StorageResult<()> {
    let mut value = HeaderValue::from_str(value).map_err(|e| {
        StorageError::invalid_argument(format!("invalid value for {}", name)).with_source(e)
    })?;
    if name == ENCRYPTION_KEY {
        value.set_sensitive(true);
    }
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

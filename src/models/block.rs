//! Block data models for block blobs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{StorageError, StorageResult};
use crate::response::RawResponse;

/// Which list a block id is looked up in when committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Committed,
    Uncommitted,
    /// Latest uncommitted version if any, else the committed one.
    Latest,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Committed => "Committed",
            BlockType::Uncommitted => "Uncommitted",
            BlockType::Latest => "Latest",
        }
    }
}

/// Block list type for GetBlockList operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockListType {
    Committed,
    Uncommitted,
    #[default]
    All,
}

impl BlockListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockListType::Committed => "committed",
            BlockListType::Uncommitted => "uncommitted",
            BlockListType::All => "all",
        }
    }
}

/// Block entry in a block list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub size: u64,
}

/// Committed and uncommitted blocks of a block blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    pub committed_blocks: Vec<Block>,
    pub uncommitted_blocks: Vec<Block>,
}

/// Result of staging a block. The blob itself is unchanged, so there is no ETag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStagedInfo {
    pub content_md5: Option<String>,
    pub server_encrypted: Option<bool>,
    pub encryption_key_sha256: Option<String>,
    pub encryption_scope: Option<String>,
}

impl BlockStagedInfo {
    pub(crate) fn from_response(raw: &RawResponse) -> Self {
        Self {
            content_md5: raw.header("content-md5").map(str::to_string),
            server_encrypted: raw.parse_header("x-ms-request-server-encrypted"),
            encryption_key_sha256: raw
                .header("x-ms-encryption-key-sha256")
                .map(str::to_string),
            encryption_scope: raw.header("x-ms-encryption-scope").map(str::to_string),
        }
    }
}

/// Checks that a block id is non-empty base64.
pub fn validate_block_id(block_id: &str) -> StorageResult<()> {
    if block_id.is_empty() {
        return Err(StorageError::invalid_argument("block id must not be empty"));
    }
    BASE64.decode(block_id).map_err(|e| {
        StorageError::invalid_argument(format!("block id '{}' is not valid base64", block_id))
            .with_source(e)
    })?;
    Ok(())
}

/// Checks every id and that all ids have the same encoded length.
pub fn validate_block_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> StorageResult<()> {
    let mut expected_len = None;
    for id in ids {
        validate_block_id(id)?;
        match expected_len {
            None => expected_len = Some(id.len()),
            Some(len) if len != id.len() => {
                return Err(StorageError::invalid_argument(
                    "all block ids of a blob must have the same length",
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

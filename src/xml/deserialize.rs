//! XML response deserialization for Azure Blob Storage API.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};
use crate::listing::{BlobPrefix, ListingPage};
use crate::models::{
    AccessPolicy, AccessTier, BlobItem, BlobType, Block, BlockList, LeaseState, LeaseStatus,
    PageList, PageRange, SignedIdentifier,
};
use crate::request::{parse_http_date, parse_iso8601};

/// Strips a UTF-8 byte order mark the service may prepend.
fn strip_bom(xml: &str) -> &str {
    xml.strip_prefix('\u{feff}').unwrap_or(xml)
}

fn from_xml<'de, T: Deserialize<'de>>(xml: &'de str, what: &str) -> StorageResult<T> {
    quick_xml::de::from_str(strip_bom(xml))
        .map_err(|e| StorageError::deserialize(format!("failed to parse {} XML", what), e))
}

/// Code and message of a service error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Parses an `<Error>` body; `None` when the body is empty or not XML.
pub fn parse_error_body(body: &[u8]) -> Option<ErrorBody> {
    let xml = std::str::from_utf8(body).ok()?;
    let xml = strip_bom(xml).trim();
    if xml.is_empty() {
        return None;
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut result = ErrorBody::default();
    let mut buf = Vec::new();
    let mut current_element: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_element = Some(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::End(_)) => {
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok()?.to_string();
                match current_element.as_deref() {
                    Some("Code") => result.code = Some(text),
                    Some("Message") => result.message = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if result.code.is_none() && result.message.is_none() {
        None
    } else {
        Some(result)
    }
}

/// Parses signed identifiers (access policy) XML.
pub fn parse_signed_identifiers(xml: &str) -> StorageResult<Vec<SignedIdentifier>> {
    let mut reader = Reader::from_str(strip_bom(xml));
    reader.trim_text(true);

    let mut identifiers = Vec::new();
    let mut buf = Vec::new();
    let mut current_text = String::new();
    let mut current = SignedIdentifier {
        id: String::new(),
        access_policy: AccessPolicy::default(),
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => {
                current_text.clear();
            }
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"Id" => current.id = std::mem::take(&mut current_text),
                    b"Start" => current.access_policy.start = parse_iso8601(&current_text),
                    b"Expiry" => current.access_policy.expiry = parse_iso8601(&current_text),
                    b"Permission" => {
                        current.access_policy.permission = std::mem::take(&mut current_text)
                    }
                    b"SignedIdentifier" => identifiers.push(std::mem::replace(
                        &mut current,
                        SignedIdentifier {
                            id: String::new(),
                            access_policy: AccessPolicy::default(),
                        },
                    )),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e
                    .unescape()
                    .map_err(|err| StorageError::deserialize("invalid signed identifier text", err))?
                    .to_string();
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(StorageError::deserialize(
                    "failed to parse signed identifiers XML",
                    err,
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(identifiers)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResultsXml {
    #[serde(rename = "@ServiceEndpoint", default)]
    service_endpoint: String,
    #[serde(rename = "@ContainerName", default)]
    container_name: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    blobs: BlobsXml,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobsXml {
    #[serde(rename = "$value", default)]
    entries: Vec<BlobsEntryXml>,
}

#[derive(Debug, Deserialize)]
enum BlobsEntryXml {
    Blob(BlobXml),
    BlobPrefix(BlobPrefixXml),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobPrefixXml {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobXml {
    name: String,
    #[serde(default)]
    deleted: Option<bool>,
    #[serde(default)]
    snapshot: Option<String>,
    #[serde(default)]
    version_id: Option<String>,
    #[serde(default)]
    is_current_version: Option<bool>,
    properties: BlobItemPropertiesXml,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct BlobItemPropertiesXml {
    #[serde(rename = "Creation-Time", default)]
    creation_time: Option<String>,
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
    #[serde(rename = "Etag", default)]
    etag: Option<String>,
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
    #[serde(rename = "Content-Type", default)]
    content_type: Option<String>,
    #[serde(rename = "BlobType", default)]
    blob_type: Option<String>,
    #[serde(rename = "AccessTier", default)]
    access_tier: Option<String>,
    #[serde(rename = "LeaseStatus", default)]
    lease_status: Option<String>,
    #[serde(rename = "LeaseState", default)]
    lease_state: Option<String>,
    #[serde(rename = "ServerEncrypted", default)]
    server_encrypted: Option<bool>,
    #[serde(rename = "EncryptionScope", default)]
    encryption_scope: Option<String>,
    #[serde(rename = "CustomerProvidedKeySha256", default)]
    customer_provided_key_sha256: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl From<BlobXml> for BlobItem {
    fn from(blob: BlobXml) -> Self {
        let props = blob.properties;
        Self {
            name: blob.name,
            deleted: blob.deleted.unwrap_or(false),
            snapshot: blob.snapshot,
            version_id: blob.version_id,
            is_current_version: blob.is_current_version,
            metadata: blob.metadata,
            created_on: props.creation_time.as_deref().and_then(parse_http_date),
            last_modified: props.last_modified.as_deref().and_then(parse_http_date),
            etag: props.etag.unwrap_or_default(),
            content_length: props.content_length.unwrap_or(0),
            content_type: non_empty(props.content_type),
            blob_type: props.blob_type.as_deref().and_then(BlobType::from_str),
            access_tier: props.access_tier.as_deref().and_then(AccessTier::from_str),
            lease_state: props.lease_state.as_deref().and_then(LeaseState::from_str),
            lease_status: props.lease_status.as_deref().and_then(LeaseStatus::from_str),
            server_encrypted: props.server_encrypted,
            encryption_scope: non_empty(props.encryption_scope),
            encryption_key_sha256: non_empty(props.customer_provided_key_sha256),
        }
    }
}

/// Parses a List Blobs `EnumerationResults` body, flat or hierarchical.
pub fn parse_blob_list(xml: &str) -> StorageResult<ListingPage> {
    let results: EnumerationResultsXml = from_xml(xml, "blob list")?;

    let mut items = Vec::new();
    let mut prefixes = Vec::new();
    for entry in results.blobs.entries {
        match entry {
            BlobsEntryXml::Blob(blob) => items.push(BlobItem::from(blob)),
            BlobsEntryXml::BlobPrefix(prefix) => prefixes.push(BlobPrefix { name: prefix.name }),
        }
    }

    Ok(ListingPage {
        service_endpoint: results.service_endpoint,
        container_name: results.container_name,
        prefix: non_empty(results.prefix),
        delimiter: non_empty(results.delimiter),
        items,
        prefixes,
        next_marker: non_empty(results.next_marker),
    })
}

#[derive(Debug, Deserialize)]
struct BlockListXml {
    #[serde(rename = "CommittedBlocks", default)]
    committed: BlocksXml,
    #[serde(rename = "UncommittedBlocks", default)]
    uncommitted: BlocksXml,
}

#[derive(Debug, Default, Deserialize)]
struct BlocksXml {
    #[serde(rename = "Block", default)]
    blocks: Vec<BlockXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockXml {
    name: String,
    size: u64,
}

/// Parses a Get Block List body.
pub fn parse_block_list(xml: &str) -> StorageResult<BlockList> {
    let list: BlockListXml = from_xml(xml, "block list")?;
    let convert = |blocks: BlocksXml| {
        blocks
            .blocks
            .into_iter()
            .map(|b| Block {
                name: b.name,
                size: b.size,
            })
            .collect()
    };
    Ok(BlockList {
        committed_blocks: convert(list.committed),
        uncommitted_blocks: convert(list.uncommitted),
    })
}

#[derive(Debug, Deserialize)]
struct PageListXml {
    #[serde(rename = "$value", default)]
    entries: Vec<PageListEntryXml>,
}

#[derive(Debug, Deserialize)]
enum PageListEntryXml {
    PageRange(RangeXml),
    ClearRange(RangeXml),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RangeXml {
    start: u64,
    end: u64,
}

/// Parses a Get Page Ranges body.
pub fn parse_page_list(xml: &str) -> StorageResult<PageList> {
    let list: PageListXml = from_xml(xml, "page list")?;
    let mut result = PageList::default();
    for entry in list.entries {
        match entry {
            PageListEntryXml::PageRange(r) => result.page_ranges.push(PageRange::new(r.start, r.end)),
            PageListEntryXml::ClearRange(r) => {
                result.clear_ranges.push(PageRange::new(r.start, r.end))
            }
        }
    }
    Ok(result)
}

//! In-memory blob service the integration tests talk to over HTTP.
//!
//! Only the behavior the client depends on is modeled: signatures, SAS
//! grants, leases, customer-provided keys and encryption scopes, listings
//! and the three blob kinds.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Md5;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use azblob_rs::auth::{shared_key, SasTarget, SasToken, SharedKeyCredential};
use azblob_rs::error::{ErrorCode, StorageError};
use azblob_rs::lease::LeaseActionKind;
use azblob_rs::models::{BlobType, LeaseState, PAGE_SIZE};
use azblob_rs::request::{format_http_date, format_iso8601, StorageRequest};
use azblob_rs::xml::xml_escape;

pub type SharedService = Arc<Mutex<FakeService>>;

const SERVICE_VERSION: &str = "2021-10-04";

/// A request as the service received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn comp(&self) -> Option<&str> {
        self.query.get("comp").map(String::as_str)
    }
}

pub struct FakeService {
    account: String,
    credential: SharedKeyCredential,
    containers: BTreeMap<String, Container>,
    requests: Vec<RecordedRequest>,
    etag_counter: u64,
}

struct Fault {
    code: ErrorCode,
    message: String,
}

impl Fault {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn from_storage(err: StorageError) -> Self {
        Self::new(
            err.error_code().unwrap_or(ErrorCode::AuthenticationFailed),
            err.message,
        )
    }
}

type Outcome = Result<Reply, Fault>;

struct Reply {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Reply {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    fn header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn xml(self, body: String) -> Self {
        let mut reply = self.header("content-type", "application/xml");
        reply.body = Bytes::from(body);
        reply
    }

    fn stamp(self, etag: &str, last_modified: &DateTime<Utc>) -> Self {
        self.header("etag", etag)
            .header("last-modified", format_http_date(last_modified))
    }

    /// Encryption echo. `request` selects the header write operations use.
    fn encryption(self, enc: &Encryption, request: bool) -> Self {
        let flag = if request {
            "x-ms-request-server-encrypted"
        } else {
            "x-ms-server-encrypted"
        };
        let reply = self.header(flag, "true");
        match enc {
            Encryption::None => reply,
            Encryption::CustomerKey(sha) => reply.header("x-ms-encryption-key-sha256", sha),
            Encryption::Scope(scope) => reply.header("x-ms-encryption-scope", scope),
        }
    }

    fn metadata(mut self, metadata: &HashMap<String, String>) -> Self {
        for (key, value) in metadata {
            self = self.header(&format!("x-ms-meta-{}", key), value);
        }
        self
    }
}

/// Per-request view handed to the operation handlers.
struct Ctx {
    method: Method,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Bytes,
    now: DateTime<Utc>,
}

impl Ctx {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn metadata(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix("x-ms-meta-")?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect()
    }

    fn http_properties(&self) -> HttpProperties {
        let get = |name: &str| self.header(name).map(str::to_string);
        HttpProperties {
            content_type: get("x-ms-blob-content-type"),
            content_encoding: get("x-ms-blob-content-encoding"),
            content_language: get("x-ms-blob-content-language"),
            content_disposition: get("x-ms-blob-content-disposition"),
            cache_control: get("x-ms-blob-cache-control"),
        }
    }

    fn verify_content_md5(&self) -> Result<(), Fault> {
        if let Some(expected) = self.header("content-md5") {
            if BASE64.encode(Md5::digest(&self.body)) != expected {
                return Err(Fault::new(ErrorCode::InvalidHeaderValue, "Content-MD5 mismatch"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Encryption {
    None,
    CustomerKey(String),
    Scope(String),
}

#[derive(Debug, Clone, Default)]
struct HttpProperties {
    content_type: Option<String>,
    content_encoding: Option<String>,
    content_language: Option<String>,
    content_disposition: Option<String>,
    cache_control: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Lease {
    state: LeaseState,
    id: Option<String>,
    /// `None` while leased means infinite.
    duration: Option<u32>,
    expires: Option<Instant>,
    break_until: Option<Instant>,
}

struct LeaseCodes {
    mismatch: ErrorCode,
    not_present: ErrorCode,
}

const BLOB_LEASE: LeaseCodes = LeaseCodes {
    mismatch: ErrorCode::LeaseIdMismatchWithBlobOperation,
    not_present: ErrorCode::LeaseNotPresentWithBlobOperation,
};

const CONTAINER_LEASE: LeaseCodes = LeaseCodes {
    mismatch: ErrorCode::LeaseIdMismatchWithContainerOperation,
    not_present: ErrorCode::LeaseNotPresentWithContainerOperation,
};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl Lease {
    fn refresh(&mut self) {
        let now = Instant::now();
        match self.state {
            LeaseState::Leased if self.expires.map_or(false, |e| now >= e) => {
                self.state = LeaseState::Expired;
            }
            LeaseState::Breaking if self.break_until.map_or(false, |b| now >= b) => {
                self.state = LeaseState::Broken;
            }
            _ => {}
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.state, LeaseState::Leased | LeaseState::Breaking)
    }

    fn remaining(deadline: Option<Instant>) -> u32 {
        deadline
            .map(|d| d.saturating_duration_since(Instant::now()).as_secs_f64().ceil() as u32)
            .unwrap_or(0)
    }

    /// Writes need the holder's id while the lease is active.
    fn check_write(&mut self, headers: &HeaderMap, codes: &LeaseCodes) -> Result<(), Fault> {
        self.refresh();
        match (self.is_active(), header(headers, "x-ms-lease-id")) {
            (true, None) => Err(Fault::new(ErrorCode::LeaseIdMissing, "lease id missing")),
            (true, Some(id)) if self.id.as_deref() != Some(id) => {
                Err(Fault::new(codes.mismatch, "lease id does not match"))
            }
            (false, Some(_)) => Err(Fault::new(codes.not_present, "no active lease")),
            _ => Ok(()),
        }
    }

    /// Reads only check an id when one is given.
    fn check_read(&mut self, headers: &HeaderMap, codes: &LeaseCodes) -> Result<(), Fault> {
        if header(headers, "x-ms-lease-id").is_some() {
            self.check_write(headers, codes)
        } else {
            Ok(())
        }
    }

    fn property_headers(&self, reply: Reply) -> Reply {
        let status = if self.is_active() { "locked" } else { "unlocked" };
        let reply = reply
            .header("x-ms-lease-state", self.state.as_str())
            .header("x-ms-lease-status", status);
        if self.state == LeaseState::Leased {
            let duration = if self.duration.is_some() { "fixed" } else { "infinite" };
            reply.header("x-ms-lease-duration", duration)
        } else {
            reply
        }
    }

    fn apply(&mut self, headers: &HeaderMap) -> Outcome {
        self.refresh();
        let action = header(headers, "x-ms-lease-action")
            .and_then(LeaseActionKind::from_str)
            .ok_or_else(|| Fault::new(ErrorCode::InvalidHeaderValue, "bad lease action"))?;
        let lease_id = header(headers, "x-ms-lease-id");
        let proposed = header(headers, "x-ms-proposed-lease-id");
        let not_present = || {
            Fault::new(
                ErrorCode::LeaseNotPresentWithLeaseOperation,
                "there is currently no lease",
            )
        };
        let require_id = || {
            lease_id.ok_or_else(|| Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-lease-id"))
        };

        match action {
            LeaseActionKind::Acquire => {
                if !self.state.allows(action) {
                    return Err(Fault::new(
                        ErrorCode::LeaseIsBreakingAndCannotBeAcquired,
                        "lease is breaking",
                    ));
                }
                let duration = match header(headers, "x-ms-lease-duration") {
                    Some("-1") => None,
                    Some(raw) => match raw.parse::<u32>() {
                        Ok(d) if (15..=60).contains(&d) => Some(d),
                        _ => {
                            return Err(Fault::new(ErrorCode::InvalidHeaderValue, "lease duration"))
                        }
                    },
                    None => {
                        return Err(Fault::new(
                            ErrorCode::MissingRequiredHeader,
                            "x-ms-lease-duration",
                        ))
                    }
                };
                if self.state == LeaseState::Leased && proposed != self.id.as_deref() {
                    return Err(Fault::new(
                        ErrorCode::LeaseAlreadyPresent,
                        "there is already a lease present",
                    ));
                }
                let id = proposed
                    .map(str::to_string)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                self.hold(id, duration);
                Ok(Reply::new(StatusCode::CREATED).header("x-ms-lease-id", self.current_id()))
            }
            LeaseActionKind::Renew => {
                let id = require_id()?;
                match self.state {
                    LeaseState::Available => return Err(not_present()),
                    s if !s.allows(action) => {
                        return Err(Fault::new(
                            ErrorCode::LeaseIsBrokenAndCannotBeRenewed,
                            "lease is broken",
                        ))
                    }
                    _ => {}
                }
                self.require_holder(id)?;
                self.hold(id.to_string(), self.duration);
                Ok(Reply::new(StatusCode::OK).header("x-ms-lease-id", id))
            }
            LeaseActionKind::Change => {
                let id = require_id()?;
                let proposed = proposed.ok_or_else(|| {
                    Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-proposed-lease-id")
                })?;
                match self.state {
                    LeaseState::Breaking => {
                        return Err(Fault::new(
                            ErrorCode::LeaseIsBreakingAndCannotBeChanged,
                            "lease is breaking",
                        ))
                    }
                    s if !s.allows(action) => return Err(not_present()),
                    _ => {}
                }
                if self.id.as_deref() != Some(proposed) {
                    self.require_holder(id)?;
                    self.id = Some(proposed.to_string());
                }
                Ok(Reply::new(StatusCode::OK).header("x-ms-lease-id", proposed))
            }
            LeaseActionKind::Release => {
                let id = require_id()?;
                if !self.state.allows(action) {
                    return Err(not_present());
                }
                self.require_holder(id)?;
                *self = Lease::default();
                Ok(Reply::new(StatusCode::OK))
            }
            LeaseActionKind::Break => {
                if !self.state.allows(action) {
                    return Err(not_present());
                }
                let period = match header(headers, "x-ms-lease-break-period") {
                    Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                        Fault::new(ErrorCode::InvalidHeaderValue, "break period")
                    })?),
                    None => None,
                };
                let remaining = match self.state {
                    LeaseState::Leased if self.duration.is_some() => Self::remaining(self.expires),
                    LeaseState::Leased => 0,
                    LeaseState::Breaking => Self::remaining(self.break_until),
                    _ => 0,
                };
                let lease_time = match (self.state, period) {
                    (LeaseState::Leased, Some(p)) if self.duration.is_none() => p,
                    (_, Some(p)) => p.min(remaining),
                    (_, None) => remaining,
                };
                if lease_time == 0 {
                    self.state = LeaseState::Broken;
                    self.break_until = None;
                } else {
                    self.state = LeaseState::Breaking;
                    self.break_until = Some(Instant::now() + Duration::from_secs(lease_time as u64));
                }
                self.expires = None;
                Ok(Reply::new(StatusCode::ACCEPTED).header("x-ms-lease-time", lease_time))
            }
        }
    }

    fn hold(&mut self, id: String, duration: Option<u32>) {
        self.state = LeaseState::Leased;
        self.id = Some(id);
        self.duration = duration;
        self.expires = duration.map(|d| Instant::now() + Duration::from_secs(d as u64));
        self.break_until = None;
    }

    fn current_id(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    fn require_holder(&self, id: &str) -> Result<(), Fault> {
        if self.id.as_deref() != Some(id) {
            return Err(Fault::new(
                ErrorCode::LeaseIdMismatchWithLeaseOperation,
                "the lease id specified did not match the lease id for the resource",
            ));
        }
        Ok(())
    }
}

struct Container {
    metadata: HashMap<String, String>,
    etag: String,
    last_modified: DateTime<Utc>,
    lease: Lease,
    public_access: Option<String>,
    default_scope: Option<String>,
    prevent_override: bool,
    identifiers: String,
    blobs: BTreeMap<String, Blob>,
}

#[derive(Debug, Clone)]
struct Blob {
    blob_type: BlobType,
    /// False while a block blob only has staged blocks.
    committed: bool,
    content: Vec<u8>,
    /// Page blobs: which 512-byte pages hold data.
    pages: Vec<bool>,
    committed_blocks: Vec<(String, Bytes)>,
    uncommitted_blocks: Vec<(String, Bytes)>,
    append_count: u32,
    metadata: HashMap<String, String>,
    http: HttpProperties,
    tier: String,
    lease: Lease,
    encryption: Encryption,
    etag: String,
    created: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    snapshots: BTreeMap<String, Blob>,
}

impl Blob {
    fn new(blob_type: BlobType, etag: String, now: DateTime<Utc>) -> Self {
        Self {
            blob_type,
            committed: true,
            content: Vec::new(),
            pages: Vec::new(),
            committed_blocks: Vec::new(),
            uncommitted_blocks: Vec::new(),
            append_count: 0,
            metadata: HashMap::new(),
            http: HttpProperties::default(),
            tier: "Hot".to_string(),
            lease: Lease::default(),
            encryption: Encryption::None,
            etag,
            created: now,
            last_modified: now,
            snapshots: BTreeMap::new(),
        }
    }

    fn touch(&mut self, etag: String, now: DateTime<Utc>) {
        self.etag = etag;
        self.last_modified = now;
    }

    fn content_reply(&self, status: StatusCode) -> Reply {
        Reply::new(status)
            .stamp(&self.etag, &self.last_modified)
            .encryption(&self.encryption, true)
    }

    fn property_headers(&self, reply: Reply) -> Reply {
        let reply = reply
            .stamp(&self.etag, &self.last_modified)
            .header("x-ms-blob-type", self.blob_type.as_str())
            .header("x-ms-creation-time", format_http_date(&self.created))
            .header(
                "content-type",
                self.http
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .metadata(&self.metadata)
            .encryption(&self.encryption, false);
        let mut reply = self.lease.property_headers(reply);
        for (name, value) in [
            ("content-encoding", &self.http.content_encoding),
            ("content-language", &self.http.content_language),
            ("content-disposition", &self.http.content_disposition),
            ("cache-control", &self.http.cache_control),
        ] {
            if let Some(value) = value {
                reply = reply.header(name, value);
            }
        }
        match self.blob_type {
            BlobType::BlockBlob => reply.header("x-ms-access-tier", &self.tier),
            BlobType::PageBlob => reply.header("x-ms-blob-sequence-number", 0),
            BlobType::AppendBlob => {
                reply.header("x-ms-blob-committed-block-count", self.append_count)
            }
        }
    }

    /// Customer-key rules for operations that touch the encrypted content.
    fn check_key(&self, requested: &Encryption) -> Result<(), Fault> {
        match (&self.encryption, requested) {
            (Encryption::CustomerKey(stored), Encryption::CustomerKey(given)) if stored == given => {
                Ok(())
            }
            (Encryption::CustomerKey(_), _) => Err(Fault::new(
                ErrorCode::BlobUsesCustomerSpecifiedEncryption,
                "the blob is encrypted with a customer specified key",
            )),
            (_, Encryption::CustomerKey(_)) => Err(Fault::new(
                ErrorCode::BlobDoesNotUseCustomerSpecifiedEncryption,
                "the blob is not encrypted with a customer specified key",
            )),
            _ => Ok(()),
        }
    }

    /// Scope rules for writes into an existing blob.
    fn check_scope(&self, requested: &Encryption, default_scope: Option<&str>) -> Result<(), Fault> {
        let effective = match requested {
            Encryption::Scope(scope) => Some(scope.as_str()),
            Encryption::None => default_scope,
            Encryption::CustomerKey(_) => return Ok(()),
        };
        let stored = match &self.encryption {
            Encryption::Scope(scope) => Some(scope.as_str()),
            _ => None,
        };
        if matches!(requested, Encryption::Scope(_)) || stored.is_some() {
            if effective != stored {
                return Err(Fault::new(
                    ErrorCode::EncryptionScopeMismatch,
                    "the encryption scope does not match the blob",
                ));
            }
        }
        Ok(())
    }

    fn check_content(&self, requested: &Encryption, default_scope: Option<&str>) -> Result<(), Fault> {
        self.check_key(requested)?;
        self.check_scope(requested, default_scope)
    }
}

impl Container {
    /// Encryption a newly written blob gets.
    fn creation_encryption(&self, requested: &Encryption) -> Result<Encryption, Fault> {
        match (requested, &self.default_scope) {
            (Encryption::CustomerKey(_), Some(_)) if self.prevent_override => Err(Fault::new(
                ErrorCode::RequestProhibitedByEncryptionScope,
                "the container requires its default encryption scope",
            )),
            (Encryption::Scope(scope), Some(default))
                if self.prevent_override && scope != default =>
            {
                Err(Fault::new(
                    ErrorCode::RequestProhibitedByEncryptionScope,
                    "the container requires its default encryption scope",
                ))
            }
            (Encryption::None, Some(default)) => Ok(Encryption::Scope(default.clone())),
            (requested, _) => Ok(requested.clone()),
        }
    }

    fn committed_blob(&mut self, name: &str) -> Result<&mut Blob, Fault> {
        self.blobs
            .get_mut(name)
            .filter(|b| b.committed)
            .ok_or_else(|| Fault::new(ErrorCode::BlobNotFound, "the specified blob does not exist"))
    }

    fn property_headers(&self, reply: Reply) -> Reply {
        let mut reply = self
            .lease
            .property_headers(reply.stamp(&self.etag, &self.last_modified))
            .metadata(&self.metadata)
            .header("x-ms-has-immutability-policy", "false")
            .header("x-ms-has-legal-hold", "false");
        if let Some(access) = &self.public_access {
            reply = reply.header("x-ms-blob-public-access", access);
        }
        if let Some(scope) = &self.default_scope {
            reply = reply
                .header("x-ms-default-encryption-scope", scope)
                .header("x-ms-deny-encryption-scope-override", self.prevent_override);
        }
        reply
    }
}

/// Parses the encryption headers of a request.
fn request_encryption(ctx: &Ctx) -> Result<Encryption, Fault> {
    let key = ctx.header("x-ms-encryption-key");
    let scope = ctx.header("x-ms-encryption-scope");
    match (key, scope) {
        (Some(_), Some(_)) => Err(Fault::new(
            ErrorCode::InvalidHeaderValue,
            "customer key and encryption scope are mutually exclusive",
        )),
        (Some(key), None) => {
            let sha = ctx.header("x-ms-encryption-key-sha256").ok_or_else(|| {
                Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-encryption-key-sha256")
            })?;
            if ctx.header("x-ms-encryption-algorithm") != Some("AES256") {
                return Err(Fault::new(ErrorCode::InvalidEncryptionAlgorithm, "AES256 only"));
            }
            let raw = BASE64
                .decode(key)
                .map_err(|_| Fault::new(ErrorCode::InvalidHeaderValue, "x-ms-encryption-key"))?;
            if BASE64.encode(Sha256::digest(&raw)) != sha {
                return Err(Fault::new(
                    ErrorCode::InvalidHeaderValue,
                    "x-ms-encryption-key-sha256 does not match the key",
                ));
            }
            Ok(Encryption::CustomerKey(sha.to_string()))
        }
        (None, Some(scope)) => Ok(Encryption::Scope(scope.to_string())),
        (None, None) => Ok(Encryption::None),
    }
}

/// Parses `bytes=a-b` / `bytes=a-` into an offset and optional inclusive end.
fn parse_range(raw: &str) -> Result<(u64, Option<u64>), Fault> {
    let invalid = || Fault::new(ErrorCode::InvalidRange, format!("invalid range '{}'", raw));
    let bounds = raw.strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start, end) = bounds.split_once('-').ok_or_else(invalid)?;
    let start = start.parse().map_err(|_| invalid())?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().map_err(|_| invalid())?)
    };
    Ok((start, end))
}

fn slice_range(content: &[u8], raw: Option<&str>) -> Result<Vec<u8>, Fault> {
    match raw {
        None => Ok(content.to_vec()),
        Some(raw) => {
            let (start, end) = parse_range(raw)?;
            let len = content.len() as u64;
            let end = end.map_or(len, |e| (e + 1).min(len));
            if start > end {
                return Err(Fault::new(ErrorCode::InvalidRange, "range out of bounds"));
            }
            Ok(content[start as usize..end as usize].to_vec())
        }
    }
}

fn parse_block_list_body(body: &[u8]) -> Result<Vec<(String, String)>, Fault> {
    let text = std::str::from_utf8(body)
        .map_err(|_| Fault::new(ErrorCode::InvalidXmlDocument, "block list is not UTF-8"))?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if matches!(name.as_str(), "Committed" | "Uncommitted" | "Latest") {
                    current = Some(name);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(kind) = current.take() {
                    let id = e
                        .unescape()
                        .map_err(|_| Fault::new(ErrorCode::InvalidXmlDocument, "bad block id"))?;
                    entries.push((kind, id.into_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(Fault::new(ErrorCode::InvalidXmlDocument, "bad block list")),
            _ => {}
        }
    }
    Ok(entries)
}

fn page_ranges_xml(pages: &[bool]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><PageList>"#);
    let mut index = 0;
    while index < pages.len() {
        if !pages[index] {
            index += 1;
            continue;
        }
        let start = index;
        while index < pages.len() && pages[index] {
            index += 1;
        }
        xml.push_str(&format!(
            "<PageRange><Start>{}</Start><End>{}</End></PageRange>",
            start as u64 * PAGE_SIZE,
            index as u64 * PAGE_SIZE - 1
        ));
    }
    xml.push_str("</PageList>");
    xml
}

fn block_list_xml(blob: &Blob, list_type: &str) -> String {
    let blocks = |list: &[(String, Bytes)]| -> String {
        list.iter()
            .map(|(id, data)| {
                format!(
                    "<Block><Name>{}</Name><Size>{}</Size></Block>",
                    xml_escape(id),
                    data.len()
                )
            })
            .collect()
    };
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    if list_type != "uncommitted" {
        xml.push_str(&format!(
            "<CommittedBlocks>{}</CommittedBlocks>",
            blocks(&blob.committed_blocks)
        ));
    }
    if list_type != "committed" {
        xml.push_str(&format!(
            "<UncommittedBlocks>{}</UncommittedBlocks>",
            blocks(&blob.uncommitted_blocks)
        ));
    }
    xml.push_str("</BlockList>");
    xml
}

fn blob_xml(name: &str, snapshot: Option<&str>, blob: &Blob, with_metadata: bool) -> String {
    let mut xml = String::from("<Blob>");
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(name)));
    if let Some(snapshot) = snapshot {
        xml.push_str(&format!("<Snapshot>{}</Snapshot>", snapshot));
    }
    xml.push_str("<Properties>");
    xml.push_str(&format!(
        "<Creation-Time>{}</Creation-Time>",
        format_http_date(&blob.created)
    ));
    xml.push_str(&format!(
        "<Last-Modified>{}</Last-Modified>",
        format_http_date(&blob.last_modified)
    ));
    xml.push_str(&format!("<Etag>{}</Etag>", xml_escape(&blob.etag)));
    xml.push_str(&format!("<Content-Length>{}</Content-Length>", blob.content.len()));
    if let Some(content_type) = &blob.http.content_type {
        xml.push_str(&format!("<Content-Type>{}</Content-Type>", xml_escape(content_type)));
    }
    xml.push_str(&format!("<BlobType>{}</BlobType>", blob.blob_type.as_str()));
    if blob.blob_type == BlobType::BlockBlob {
        xml.push_str(&format!("<AccessTier>{}</AccessTier>", blob.tier));
    }
    let status = if blob.lease.is_active() { "locked" } else { "unlocked" };
    xml.push_str(&format!("<LeaseStatus>{}</LeaseStatus>", status));
    xml.push_str(&format!(
        "<LeaseState>{}</LeaseState>",
        blob.lease.state.as_str()
    ));
    xml.push_str("<ServerEncrypted>true</ServerEncrypted>");
    match &blob.encryption {
        Encryption::CustomerKey(sha) => xml.push_str(&format!(
            "<CustomerProvidedKeySha256>{}</CustomerProvidedKeySha256>",
            sha
        )),
        Encryption::Scope(scope) => xml.push_str(&format!(
            "<EncryptionScope>{}</EncryptionScope>",
            xml_escape(scope)
        )),
        Encryption::None => {}
    }
    xml.push_str("</Properties>");
    if with_metadata && !blob.metadata.is_empty() {
        xml.push_str("<Metadata>");
        for (key, value) in &blob.metadata {
            xml.push_str(&format!("<{}>{}</{}>", key, xml_escape(value), key));
        }
        xml.push_str("</Metadata>");
    }
    xml.push_str("</Blob>");
    xml
}

enum ListEntry<'a> {
    Blob {
        name: &'a str,
        snapshot: Option<&'a str>,
        blob: &'a Blob,
    },
    Prefix(String),
}

impl ListEntry<'_> {
    fn key(&self) -> &str {
        match self {
            ListEntry::Blob { name, .. } => name,
            ListEntry::Prefix(prefix) => prefix,
        }
    }
}

impl FakeService {
    pub fn new(account: &str, key: &str) -> Self {
        Self {
            account: account.to_string(),
            credential: SharedKeyCredential::new(account, key)
                .expect("test account key must be valid"),
            containers: BTreeMap::new(),
            requests: Vec::new(),
            etag_counter: 0,
        }
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }

    /// The most recent request carrying `comp=<comp>` (or no comp for `None`).
    pub fn last_request(&self, method: &Method, comp: Option<&str>) -> Option<RecordedRequest> {
        self.requests
            .iter()
            .rev()
            .find(|r| &r.method == method && r.comp() == comp)
            .cloned()
    }

    fn next_etag(&mut self) -> String {
        self.etag_counter += 1;
        format!("\"0x8DC{:013X}\"", self.etag_counter)
    }

    fn dispatch(&mut self, method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Outcome {
        let url = Url::parse(&format!("http://localhost{}", uri))
            .map_err(|_| Fault::new(ErrorCode::InvalidInput, "bad request uri"))?;
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        self.requests.push(RecordedRequest {
            method: method.clone(),
            path: url.path().to_string(),
            query: query.clone(),
            headers: headers.clone(),
        });

        let segments: Vec<String> = url
            .path_segments()
            .map(|s| {
                s.map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        if segments.first() != Some(&self.account) {
            return Err(Fault::new(ErrorCode::ResourceNotFound, "unknown account"));
        }
        let container = segments
            .get(1)
            .filter(|c| !c.is_empty())
            .cloned()
            .ok_or_else(|| Fault::new(ErrorCode::InvalidResourceName, "container missing"))?;
        let blob = (segments.len() > 2).then(|| segments[2..].join("/"));

        let request = StorageRequest {
            method: method.clone(),
            url,
            headers: headers.clone(),
            body: body.clone(),
        };
        self.authenticate(&request, &query, &container, blob.as_deref())?;

        let ctx = Ctx {
            method,
            headers,
            query,
            body,
            now: Utc::now(),
        };
        match blob {
            None => self.container_op(&container, &ctx),
            Some(blob) => self.blob_op(&container, &blob, &ctx),
        }
    }

    fn authenticate(
        &self,
        request: &StorageRequest,
        query: &HashMap<String, String>,
        container: &str,
        blob: Option<&str>,
    ) -> Result<(), Fault> {
        if let Some(authorization) = request.header("authorization") {
            let string_to_sign = shared_key::string_to_sign(request, &self.account);
            let signature = self
                .credential
                .sign(&string_to_sign)
                .map_err(Fault::from_storage)?;
            if authorization != format!("SharedKey {}:{}", self.account, signature) {
                tracing::debug!("signature mismatch, string to sign: {:?}", string_to_sign);
                return Err(Fault::new(
                    ErrorCode::AuthenticationFailed,
                    "the MAC signature found in the request is not the same as any computed signature",
                ));
            }
            return Ok(());
        }

        if query.contains_key("sig") {
            let token = SasToken::parse(request.url.query().unwrap_or(""))
                .map_err(|e| Fault::new(ErrorCode::AuthenticationFailed, e.message))?;
            let target = match blob {
                Some(blob) => SasTarget::blob(container, blob),
                None => SasTarget::container(container),
            };
            let permission = match (&request.method, query.get("comp").map(String::as_str)) {
                (&Method::GET, Some("list")) => 'l',
                (&Method::GET | &Method::HEAD, _) => 'r',
                (&Method::DELETE, _) => 'd',
                _ => 'w',
            };
            return token
                .authorize(&self.credential, target, permission, Utc::now())
                .map_err(Fault::from_storage);
        }

        Err(Fault::new(
            ErrorCode::AuthenticationFailed,
            "the request carries no credentials",
        ))
    }

    /// Resolves `x-ms-copy-source` to the bytes it names.
    fn read_copy_source(&self, source: &str, range: Option<&str>) -> Result<Vec<u8>, Fault> {
        let cannot_verify =
            |message: &str| Fault::new(ErrorCode::CannotVerifyCopySource, message.to_string());
        let url = Url::parse(source).map_err(|_| cannot_verify("copy source is not a URL"))?;
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| {
                s.map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        if segments.len() < 3 || segments[0] != self.account {
            return Err(cannot_verify("copy source is not in this account"));
        }
        let container_name = &segments[1];
        let blob_name = segments[2..].join("/");
        let container = self
            .containers
            .get(container_name)
            .ok_or_else(|| cannot_verify("copy source container does not exist"))?;

        match url.query().filter(|q| q.contains("sig=")) {
            Some(query) => {
                let token = SasToken::parse(query).map_err(|e| cannot_verify(&e.message))?;
                token
                    .authorize(
                        &self.credential,
                        SasTarget::blob(container_name, &blob_name),
                        'r',
                        Utc::now(),
                    )
                    .map_err(|e| cannot_verify(&e.message))?;
            }
            None if container.public_access.is_some() => {}
            None => return Err(cannot_verify("copy source requires authorization")),
        }

        let blob = container
            .blobs
            .get(&blob_name)
            .filter(|b| b.committed)
            .ok_or_else(|| cannot_verify("copy source blob does not exist"))?;
        slice_range(&blob.content, range)
    }

    fn container_op(&mut self, name: &str, ctx: &Ctx) -> Outcome {
        if ctx.query("restype") != Some("container") {
            return Err(Fault::new(
                ErrorCode::InvalidQueryParameterValue,
                "restype=container is required",
            ));
        }
        let etag = self.next_etag();

        if ctx.method == Method::PUT && ctx.query("comp").is_none() {
            if self.containers.contains_key(name) {
                return Err(Fault::new(
                    ErrorCode::ContainerAlreadyExists,
                    "the specified container already exists",
                ));
            }
            let container = Container {
                metadata: ctx.metadata(),
                etag,
                last_modified: ctx.now,
                lease: Lease::default(),
                public_access: ctx.header("x-ms-blob-public-access").map(str::to_string),
                default_scope: ctx
                    .header("x-ms-default-encryption-scope")
                    .map(str::to_string),
                prevent_override: ctx.header("x-ms-deny-encryption-scope-override")
                    == Some("true"),
                identifiers: String::new(),
                blobs: BTreeMap::new(),
            };
            let reply = Reply::new(StatusCode::CREATED).stamp(&container.etag, &container.last_modified);
            self.containers.insert(name.to_string(), container);
            return Ok(reply);
        }

        let container = self.containers.get_mut(name).ok_or_else(|| {
            Fault::new(ErrorCode::ContainerNotFound, "the specified container does not exist")
        })?;

        match (&ctx.method, ctx.query("comp")) {
            (&Method::DELETE, None) => {
                container.lease.check_write(&ctx.headers, &CONTAINER_LEASE)?;
                self.containers.remove(name);
                Ok(Reply::new(StatusCode::ACCEPTED))
            }
            (&Method::GET | &Method::HEAD, None) => {
                container.lease.check_read(&ctx.headers, &CONTAINER_LEASE)?;
                Ok(container.property_headers(Reply::new(StatusCode::OK)))
            }
            (&Method::PUT, Some("metadata")) => {
                container.lease.check_read(&ctx.headers, &CONTAINER_LEASE)?;
                container.metadata = ctx.metadata();
                container.etag = etag;
                container.last_modified = ctx.now;
                Ok(Reply::new(StatusCode::OK).stamp(&container.etag, &container.last_modified))
            }
            (&Method::GET, Some("acl")) => {
                container.lease.check_read(&ctx.headers, &CONTAINER_LEASE)?;
                let body = if container.identifiers.is_empty() {
                    r#"<?xml version="1.0" encoding="utf-8"?><SignedIdentifiers></SignedIdentifiers>"#
                        .to_string()
                } else {
                    container.identifiers.clone()
                };
                let mut reply = Reply::new(StatusCode::OK)
                    .stamp(&container.etag, &container.last_modified)
                    .xml(body);
                if let Some(access) = &container.public_access {
                    reply = reply.header("x-ms-blob-public-access", access);
                }
                Ok(reply)
            }
            (&Method::PUT, Some("acl")) => {
                container.lease.check_read(&ctx.headers, &CONTAINER_LEASE)?;
                container.identifiers = String::from_utf8_lossy(&ctx.body).into_owned();
                container.public_access = ctx.header("x-ms-blob-public-access").map(str::to_string);
                container.etag = etag;
                container.last_modified = ctx.now;
                Ok(Reply::new(StatusCode::OK).stamp(&container.etag, &container.last_modified))
            }
            (&Method::GET, Some("list")) => Ok(list_blobs(&self.account, name, container, ctx)),
            (&Method::PUT, Some("lease")) => {
                let reply = container.lease.apply(&ctx.headers)?;
                Ok(reply.stamp(&container.etag, &container.last_modified))
            }
            _ => Err(Fault::new(ErrorCode::InvalidInput, "unsupported container operation")),
        }
    }

    fn blob_op(&mut self, container_name: &str, name: &str, ctx: &Ctx) -> Outcome {
        let copy_source = match ctx.header("x-ms-copy-source") {
            Some(source) => Some(self.read_copy_source(source, ctx.header("x-ms-source-range"))?),
            None => None,
        };
        let requested = request_encryption(ctx)?;
        let etag = self.next_etag();
        let container = self.containers.get_mut(container_name).ok_or_else(|| {
            Fault::new(ErrorCode::ContainerNotFound, "the specified container does not exist")
        })?;
        let default_scope = container.default_scope.clone();
        let default_scope = default_scope.as_deref();

        match (&ctx.method, ctx.query("comp")) {
            (&Method::PUT, None) => {
                let blob_type = ctx
                    .header("x-ms-blob-type")
                    .and_then(BlobType::from_str)
                    .ok_or_else(|| Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-blob-type"))?;
                let encryption = container.creation_encryption(&requested)?;
                let (lease, snapshots) = match container.blobs.get_mut(name) {
                    Some(existing) if existing.committed => {
                        existing.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                        (existing.lease.clone(), existing.snapshots.clone())
                    }
                    _ => (Lease::default(), BTreeMap::new()),
                };

                let mut blob = Blob::new(blob_type, etag, ctx.now);
                match blob_type {
                    BlobType::BlockBlob => {
                        ctx.verify_content_md5()?;
                        blob.content = ctx.body.to_vec();
                    }
                    BlobType::PageBlob => {
                        let size: u64 = ctx
                            .header("x-ms-blob-content-length")
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| {
                                Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-blob-content-length")
                            })?;
                        if size % PAGE_SIZE != 0 {
                            return Err(Fault::new(ErrorCode::InvalidHeaderValue, "unaligned size"));
                        }
                        blob.content = vec![0; size as usize];
                        blob.pages = vec![false; (size / PAGE_SIZE) as usize];
                    }
                    BlobType::AppendBlob => {}
                }
                blob.metadata = ctx.metadata();
                blob.http = ctx.http_properties();
                if let Some(tier) = ctx.header("x-ms-access-tier") {
                    blob.tier = tier.to_string();
                }
                blob.encryption = encryption;
                blob.lease = lease;
                blob.snapshots = snapshots;

                let reply = blob.content_reply(StatusCode::CREATED);
                container.blobs.insert(name.to_string(), blob);
                Ok(reply)
            }
            (&Method::PUT, Some("block")) => {
                let block_id = ctx
                    .query("blockid")
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| Fault::new(ErrorCode::InvalidBlockId, "block id missing"))?
                    .to_string();
                let encryption = container.creation_encryption(&requested)?;
                let data = match copy_source {
                    Some(data) => Bytes::from(data),
                    None => {
                        ctx.verify_content_md5()?;
                        ctx.body.clone()
                    }
                };

                let blob = container.blobs.entry(name.to_string()).or_insert_with(|| {
                    let mut blob = Blob::new(BlobType::BlockBlob, etag, ctx.now);
                    blob.committed = false;
                    blob
                });
                if blob.blob_type != BlobType::BlockBlob {
                    return Err(Fault::new(ErrorCode::InvalidBlobType, "not a block blob"));
                }
                if blob.committed {
                    blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                }
                blob.uncommitted_blocks.retain(|(id, _)| id != &block_id);
                blob.uncommitted_blocks.push((block_id, data));
                Ok(Reply::new(StatusCode::CREATED).encryption(&encryption, true))
            }
            (&Method::PUT, Some("blocklist")) => {
                let entries = parse_block_list_body(&ctx.body)?;
                ctx.verify_content_md5()?;
                let encryption = container.creation_encryption(&requested)?;
                let blob = container.blobs.entry(name.to_string()).or_insert_with(|| {
                    let mut blob = Blob::new(BlobType::BlockBlob, etag.clone(), ctx.now);
                    blob.committed = false;
                    blob
                });
                if blob.blob_type != BlobType::BlockBlob {
                    return Err(Fault::new(ErrorCode::InvalidBlobType, "not a block blob"));
                }
                if blob.committed {
                    blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                }

                let find = |list: &[(String, Bytes)], id: &str| {
                    list.iter().find(|(b, _)| b == id).map(|(_, data)| data.clone())
                };
                let mut blocks = Vec::with_capacity(entries.len());
                for (kind, id) in &entries {
                    let data = match kind.as_str() {
                        "Committed" => find(&blob.committed_blocks, id),
                        "Uncommitted" => find(&blob.uncommitted_blocks, id),
                        _ => find(&blob.uncommitted_blocks, id)
                            .or_else(|| find(&blob.committed_blocks, id)),
                    };
                    let data = data.ok_or_else(|| {
                        Fault::new(ErrorCode::InvalidBlockList, format!("unknown block {}", id))
                    })?;
                    blocks.push((id.clone(), data));
                }

                blob.content = blocks.iter().flat_map(|(_, d)| d.iter().copied()).collect();
                blob.committed_blocks = blocks;
                blob.uncommitted_blocks.clear();
                blob.committed = true;
                blob.metadata = ctx.metadata();
                blob.http = ctx.http_properties();
                blob.encryption = encryption;
                blob.touch(etag, ctx.now);
                Ok(blob.content_reply(StatusCode::CREATED))
            }
            (&Method::GET, Some("blocklist")) => {
                let blob = container
                    .blobs
                    .get_mut(name)
                    .ok_or_else(|| Fault::new(ErrorCode::BlobNotFound, "the specified blob does not exist"))?;
                blob.lease.check_read(&ctx.headers, &BLOB_LEASE)?;
                let list_type = ctx.query("blocklisttype").unwrap_or("committed");
                Ok(Reply::new(StatusCode::OK)
                    .stamp(&blob.etag, &blob.last_modified)
                    .xml(block_list_xml(blob, list_type)))
            }
            (&Method::PUT, Some("appendblock")) => {
                let blob = container.committed_blob(name)?;
                if blob.blob_type != BlobType::AppendBlob {
                    return Err(Fault::new(ErrorCode::InvalidBlobType, "not an append blob"));
                }
                blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                blob.check_content(&requested, default_scope)?;
                let data = match copy_source {
                    Some(data) => data,
                    None => {
                        ctx.verify_content_md5()?;
                        ctx.body.to_vec()
                    }
                };

                let offset = blob.content.len() as u64;
                if let Some(position) = ctx.header("x-ms-blob-condition-appendpos") {
                    if position.parse::<u64>().ok() != Some(offset) {
                        return Err(Fault::new(
                            ErrorCode::AppendPositionConditionNotMet,
                            "the append position condition was not met",
                        ));
                    }
                }
                if let Some(max) = ctx.header("x-ms-blob-condition-maxsize") {
                    if max.parse::<u64>().map_or(true, |m| offset + data.len() as u64 > m) {
                        return Err(Fault::new(
                            ErrorCode::MaxBlobSizeConditionNotMet,
                            "the max blob size condition was not met",
                        ));
                    }
                }

                blob.content.extend_from_slice(&data);
                blob.append_count += 1;
                blob.touch(etag, ctx.now);
                Ok(blob
                    .content_reply(StatusCode::CREATED)
                    .header("x-ms-blob-append-offset", offset)
                    .header("x-ms-blob-committed-block-count", blob.append_count))
            }
            (&Method::PUT, Some("page")) => {
                let blob = container.committed_blob(name)?;
                if blob.blob_type != BlobType::PageBlob {
                    return Err(Fault::new(ErrorCode::InvalidBlobType, "not a page blob"));
                }
                blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                blob.check_content(&requested, default_scope)?;

                let range = ctx
                    .header("x-ms-range")
                    .ok_or_else(|| Fault::new(ErrorCode::MissingRequiredHeader, "x-ms-range"))?;
                let (start, end) = match parse_range(range)? {
                    (start, Some(end)) => (start, end + 1),
                    _ => return Err(Fault::new(ErrorCode::InvalidPageRange, "open range")),
                };
                if start % PAGE_SIZE != 0 || end % PAGE_SIZE != 0 || end > blob.content.len() as u64
                {
                    return Err(Fault::new(ErrorCode::InvalidPageRange, "invalid page range"));
                }

                let write = ctx.header("x-ms-page-write").unwrap_or("update");
                let (data, written) = if write == "clear" {
                    (vec![0; (end - start) as usize], false)
                } else {
                    let data = match copy_source {
                        Some(data) => data,
                        None => {
                            ctx.verify_content_md5()?;
                            ctx.body.to_vec()
                        }
                    };
                    (data, true)
                };
                if data.len() as u64 != end - start {
                    return Err(Fault::new(ErrorCode::InvalidHeaderValue, "body length mismatch"));
                }
                blob.content[start as usize..end as usize].copy_from_slice(&data);
                for page in (start / PAGE_SIZE)..(end / PAGE_SIZE) {
                    blob.pages[page as usize] = written;
                }
                blob.touch(etag, ctx.now);
                Ok(blob
                    .content_reply(StatusCode::CREATED)
                    .header("x-ms-blob-sequence-number", 0))
            }
            (&Method::GET, Some("pagelist")) => {
                let blob = container.committed_blob(name)?;
                if blob.blob_type != BlobType::PageBlob {
                    return Err(Fault::new(ErrorCode::InvalidBlobType, "not a page blob"));
                }
                blob.lease.check_read(&ctx.headers, &BLOB_LEASE)?;
                Ok(Reply::new(StatusCode::OK)
                    .stamp(&blob.etag, &blob.last_modified)
                    .header("x-ms-blob-content-length", blob.content.len())
                    .xml(page_ranges_xml(&blob.pages)))
            }
            (&Method::PUT, Some("properties")) => {
                let blob = container.committed_blob(name)?;
                blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                match ctx.header("x-ms-blob-content-length") {
                    Some(size) => {
                        if blob.blob_type != BlobType::PageBlob {
                            return Err(Fault::new(ErrorCode::InvalidBlobType, "not a page blob"));
                        }
                        blob.check_content(&requested, default_scope)?;
                        let size: u64 = size.parse().map_err(|_| {
                            Fault::new(ErrorCode::InvalidHeaderValue, "x-ms-blob-content-length")
                        })?;
                        if size % PAGE_SIZE != 0 {
                            return Err(Fault::new(ErrorCode::InvalidHeaderValue, "unaligned size"));
                        }
                        blob.content.resize(size as usize, 0);
                        blob.pages.resize((size / PAGE_SIZE) as usize, false);
                        blob.touch(etag, ctx.now);
                        Ok(Reply::new(StatusCode::OK)
                            .stamp(&blob.etag, &blob.last_modified)
                            .header("x-ms-blob-sequence-number", 0))
                    }
                    None => {
                        blob.http = ctx.http_properties();
                        blob.touch(etag, ctx.now);
                        Ok(Reply::new(StatusCode::OK).stamp(&blob.etag, &blob.last_modified))
                    }
                }
            }
            (&Method::PUT, Some("metadata")) => {
                let blob = container.committed_blob(name)?;
                blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                blob.check_content(&requested, default_scope)?;
                blob.metadata = ctx.metadata();
                blob.touch(etag, ctx.now);
                Ok(blob.content_reply(StatusCode::OK))
            }
            (&Method::PUT, Some("snapshot")) => {
                let blob = container.committed_blob(name)?;
                blob.lease.check_read(&ctx.headers, &BLOB_LEASE)?;
                blob.check_content(&requested, default_scope)?;

                let mut snapshot_id = format_iso8601(&ctx.now);
                let mut offset = 1;
                while blob.snapshots.contains_key(&snapshot_id) {
                    snapshot_id =
                        format_iso8601(&(ctx.now + chrono::Duration::microseconds(offset)));
                    offset += 1;
                }
                let mut snapshot = blob.clone();
                snapshot.snapshots.clear();
                snapshot.lease = Lease::default();
                let metadata = ctx.metadata();
                if !metadata.is_empty() {
                    snapshot.metadata = metadata;
                }
                blob.snapshots.insert(snapshot_id.clone(), snapshot);
                Ok(Reply::new(StatusCode::CREATED)
                    .stamp(&blob.etag, &blob.last_modified)
                    .header("x-ms-snapshot", snapshot_id)
                    .header("x-ms-request-server-encrypted", "true"))
            }
            (&Method::PUT, Some("tier")) => {
                let blob = container.committed_blob(name)?;
                blob.lease.check_read(&ctx.headers, &BLOB_LEASE)?;
                if matches!(blob.encryption, Encryption::CustomerKey(_)) {
                    return Err(Fault::new(
                        ErrorCode::BlobUsesCustomerSpecifiedEncryption,
                        "tier changes are not supported for blobs with customer specified keys",
                    ));
                }
                let tier = ctx
                    .header("x-ms-access-tier")
                    .filter(|t| matches!(*t, "Hot" | "Cool" | "Cold" | "Archive"))
                    .ok_or_else(|| Fault::new(ErrorCode::InvalidHeaderValue, "x-ms-access-tier"))?;
                blob.tier = tier.to_string();
                Ok(Reply::new(StatusCode::OK))
            }
            (&Method::PUT, Some("lease")) => {
                let blob = container.committed_blob(name)?;
                let reply = blob.lease.apply(&ctx.headers)?;
                Ok(reply.stamp(&blob.etag, &blob.last_modified))
            }
            (&Method::GET | &Method::HEAD, None) => {
                let head = ctx.method == Method::HEAD;
                let blob = container.committed_blob(name)?;
                blob.lease.check_read(&ctx.headers, &BLOB_LEASE)?;
                let target = match ctx.query("snapshot") {
                    Some(snapshot) => blob.snapshots.get(snapshot).ok_or_else(|| {
                        Fault::new(ErrorCode::BlobNotFound, "the specified snapshot does not exist")
                    })?,
                    None => &*blob,
                };
                target.check_key(&requested)?;

                if head {
                    return Ok(target
                        .property_headers(Reply::new(StatusCode::OK))
                        .header("content-length", target.content.len()));
                }

                let range = ctx.header("x-ms-range");
                let content = slice_range(&target.content, range)?;
                let mut reply = target.property_headers(Reply::new(if range.is_some() {
                    StatusCode::PARTIAL_CONTENT
                } else {
                    StatusCode::OK
                }));
                if let Some(raw) = range {
                    let (start, _) = parse_range(raw)?;
                    let end = start + content.len() as u64;
                    reply = reply.header(
                        "content-range",
                        format!("bytes {}-{}/{}", start, end.saturating_sub(1), target.content.len()),
                    );
                }
                reply.body = Bytes::from(content);
                Ok(reply)
            }
            (&Method::DELETE, None) => {
                if let Some(snapshot) = ctx.query("snapshot") {
                    let blob = container.committed_blob(name)?;
                    blob.snapshots.remove(snapshot).ok_or_else(|| {
                        Fault::new(ErrorCode::BlobNotFound, "the specified snapshot does not exist")
                    })?;
                    return Ok(Reply::new(StatusCode::ACCEPTED));
                }

                let blob = container.committed_blob(name)?;
                blob.lease.check_write(&ctx.headers, &BLOB_LEASE)?;
                match ctx.header("x-ms-delete-snapshots") {
                    Some("only") => {
                        blob.snapshots.clear();
                        return Ok(Reply::new(StatusCode::ACCEPTED));
                    }
                    Some("include") => {}
                    _ if !blob.snapshots.is_empty() => {
                        return Err(Fault::new(
                            ErrorCode::SnapshotsPresent,
                            "this operation is not permitted because the blob has snapshots",
                        ))
                    }
                    _ => {}
                }
                container.blobs.remove(name);
                Ok(Reply::new(StatusCode::ACCEPTED))
            }
            _ => Err(Fault::new(ErrorCode::InvalidInput, "unsupported blob operation")),
        }
    }
}

fn list_blobs(account: &str, container_name: &str, container: &Container, ctx: &Ctx) -> Reply {
    let prefix = ctx.query("prefix").unwrap_or("");
    let delimiter = ctx.query("delimiter").filter(|d| !d.is_empty());
    let marker = ctx.query("marker").unwrap_or("");
    let max_results: usize = ctx
        .query("maxresults")
        .and_then(|m| m.parse().ok())
        .unwrap_or(5000);
    let include: Vec<&str> = ctx
        .query("include")
        .map(|i| i.split(',').collect())
        .unwrap_or_default();

    let mut entries = Vec::new();
    let mut prefixes = BTreeSet::new();
    for (name, blob) in &container.blobs {
        if !blob.committed || !name.starts_with(prefix) {
            continue;
        }
        if let Some(delimiter) = delimiter {
            if let Some(index) = name[prefix.len()..].find(delimiter) {
                let virtual_dir = name[..prefix.len() + index + delimiter.len()].to_string();
                if prefixes.insert(virtual_dir.clone()) {
                    entries.push(ListEntry::Prefix(virtual_dir));
                }
                continue;
            }
        }
        if include.contains(&"snapshots") {
            for (snapshot, data) in &blob.snapshots {
                entries.push(ListEntry::Blob {
                    name,
                    snapshot: Some(snapshot),
                    blob: data,
                });
            }
        }
        entries.push(ListEntry::Blob {
            name,
            snapshot: None,
            blob,
        });
    }

    let mut remaining = entries.into_iter().filter(|e| e.key() >= marker).peekable();
    let page: Vec<_> = remaining.by_ref().take(max_results).collect();
    let next_marker = remaining.peek().map(|e| e.key().to_string());

    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<EnumerationResults ServiceEndpoint="http://127.0.0.1/{}/" ContainerName="{}">"#,
        xml_escape(account),
        xml_escape(container_name)
    ));
    if !prefix.is_empty() {
        xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(prefix)));
    }
    if !marker.is_empty() {
        xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(marker)));
    }
    xml.push_str(&format!("<MaxResults>{}</MaxResults>", max_results));
    if let Some(delimiter) = delimiter {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", xml_escape(delimiter)));
    }
    xml.push_str("<Blobs>");
    for entry in &page {
        match entry {
            ListEntry::Blob {
                name,
                snapshot,
                blob,
            } => xml.push_str(&blob_xml(name, *snapshot, blob, include.contains(&"metadata"))),
            ListEntry::Prefix(prefix) => xml.push_str(&format!(
                "<BlobPrefix><Name>{}</Name></BlobPrefix>",
                xml_escape(prefix)
            )),
        }
    }
    xml.push_str("</Blobs>");
    xml.push_str(&format!(
        "<NextMarker>{}</NextMarker>",
        next_marker.as_deref().map(xml_escape).unwrap_or_default()
    ));
    xml.push_str("</EnumerationResults>");

    Reply::new(StatusCode::OK).xml(xml)
}

/// Axum fallback handler: every request lands here.
pub async fn handle(
    State(service): State<SharedService>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let client_request_id = header(&headers, "x-ms-client-request-id").map(str::to_string);
    let head = method == Method::HEAD;

    let outcome = service.lock().dispatch(method, &uri, headers, body);
    let reply = match outcome {
        Ok(reply) => reply,
        Err(fault) => {
            tracing::debug!(code = fault.code.as_str(), message = %fault.message, "request failed");
            let body = format!(
                r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>{}</Code><Message>{}</Message></Error>"#,
                fault.code.as_str(),
                xml_escape(&fault.message)
            );
            let reply = Reply::new(fault.code.status_code()).header("x-ms-error-code", fault.code.as_str());
            if head {
                reply
            } else {
                reply.xml(body)
            }
        }
    };

    let mut builder = Response::builder()
        .status(reply.status)
        .header("x-ms-request-id", &request_id)
        .header("x-ms-version", SERVICE_VERSION)
        .header("date", format_http_date(&Utc::now()));
    if let Some(id) = client_request_id {
        builder = builder.header("x-ms-client-request-id", id);
    }
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(reply.body))
        .expect("fake service produced an invalid response")
}

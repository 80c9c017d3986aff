//! Service SAS generation for containers and blobs.

use chrono::{DateTime, Utc};
use url::form_urlencoded;

use crate::config::DEFAULT_SAS_VERSION;
use crate::error::{StorageError, StorageResult};

use super::{format_sas_datetime, SharedKeyCredential};

/// Signed resource (`sr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource {
    Container,
    Blob,
    BlobSnapshot,
    BlobVersion,
}

impl SasResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SasResource::Container => "c",
            SasResource::Blob => "b",
            SasResource::BlobSnapshot => "bs",
            SasResource::BlobVersion => "bv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "c" => Some(SasResource::Container),
            "b" => Some(SasResource::Blob),
            "bs" => Some(SasResource::BlobSnapshot),
            "bv" => Some(SasResource::BlobVersion),
            _ => None,
        }
    }
}

/// Signed protocol (`spr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasProtocol {
    Https,
    HttpsAndHttp,
}

impl SasProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SasProtocol::Https => "https",
            SasProtocol::HttpsAndHttp => "https,http",
        }
    }
}

/// Blob SAS permissions, rendered in canonical `racwdxlt` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobSasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub delete_version: bool,
    pub list: bool,
    pub tags: bool,
}

impl BlobSasPermissions {
    /// Parses permission letters in any order.
    pub fn parse(s: &str) -> StorageResult<Self> {
        let mut perms = Self::default();
        for c in s.chars() {
            match c {
                'r' => perms.read = true,
                'a' => perms.add = true,
                'c' => perms.create = true,
                'w' => perms.write = true,
                'd' => perms.delete = true,
                'x' => perms.delete_version = true,
                'l' => perms.list = true,
                't' => perms.tags = true,
                other => {
                    return Err(StorageError::invalid_argument(format!(
                        "unknown SAS permission '{}'",
                        other
                    )))
                }
            }
        }
        Ok(perms)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl std::fmt::Display for BlobSasPermissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.delete_version, 'x'),
            (self.list, 'l'),
            (self.tags, 't'),
        ];
        for (set, c) in flags {
            if set {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// Builds a signed service SAS query string.
#[derive(Debug, Clone)]
pub struct BlobSasBuilder {
    container: String,
    blob: Option<String>,
    snapshot: Option<String>,
    version_id: Option<String>,
    permissions: BlobSasPermissions,
    protocol: Option<SasProtocol>,
    start: Option<DateTime<Utc>>,
    expiry: Option<DateTime<Utc>>,
    identifier: Option<String>,
    ip_range: Option<String>,
    encryption_scope: Option<String>,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    content_language: Option<String>,
    content_type: Option<String>,
    version: String,
}

impl BlobSasBuilder {
    /// Starts a container SAS; call [`blob`](Self::blob) to narrow it.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: None,
            snapshot: None,
            version_id: None,
            permissions: BlobSasPermissions::default(),
            protocol: None,
            start: None,
            expiry: None,
            identifier: None,
            ip_range: None,
            encryption_scope: None,
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            content_type: None,
            version: DEFAULT_SAS_VERSION.to_string(),
        }
    }

    pub fn blob(mut self, name: impl Into<String>) -> Self {
        self.blob = Some(name.into());
        self
    }

    pub fn snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    pub fn version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn permissions(mut self, permissions: BlobSasPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn protocol(mut self, protocol: SasProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Refers to a stored access policy on the container.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn ip_range(mut self, ip_range: impl Into<String>) -> Self {
        self.ip_range = Some(ip_range.into());
        self
    }

    pub fn encryption_scope(mut self, scope: impl Into<String>) -> Self {
        self.encryption_scope = Some(scope.into());
        self
    }

    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    pub fn content_encoding(mut self, value: impl Into<String>) -> Self {
        self.content_encoding = Some(value.into());
        self
    }

    pub fn content_language(mut self, value: impl Into<String>) -> Self {
        self.content_language = Some(value.into());
        self
    }

    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    /// Returns the signed resource kind implied by the builder state.
    pub fn resource(&self) -> SasResource {
        match (&self.blob, &self.snapshot, &self.version_id) {
            (None, _, _) => SasResource::Container,
            (Some(_), Some(_), _) => SasResource::BlobSnapshot,
            (Some(_), None, Some(_)) => SasResource::BlobVersion,
            (Some(_), None, None) => SasResource::Blob,
        }
    }

    fn validate(&self) -> StorageResult<()> {
        if self.container.is_empty() {
            return Err(StorageError::invalid_argument("SAS container name must not be empty"));
        }
        if self.blob.as_deref() == Some("") {
            return Err(StorageError::invalid_argument("SAS blob name must not be empty"));
        }
        if self.identifier.is_none() {
            if self.expiry.is_none() {
                return Err(StorageError::invalid_argument(
                    "SAS expiry is required without a stored access policy",
                ));
            }
            if self.permissions.is_empty() {
                return Err(StorageError::invalid_argument(
                    "SAS permissions are required without a stored access policy",
                ));
            }
        }
        if let (Some(start), Some(expiry)) = (self.start, self.expiry) {
            if expiry <= start {
                return Err(StorageError::invalid_argument("SAS expiry must be after start"));
            }
        }
        Ok(())
    }

    fn canonicalized_resource(&self, account: &str) -> String {
        let mut resource = format!("/blob/{}/{}", account, self.container);
        if let Some(ref blob) = self.blob {
            resource.push('/');
            resource.push_str(blob);
        }
        resource
    }

    /// Builds the string-to-sign.
    pub fn string_to_sign(&self, account: &str) -> StorageResult<String> {
        self.validate()?;

        let permissions = if self.permissions.is_empty() {
            String::new()
        } else {
            self.permissions.to_string()
        };
        let snapshot_time = match self.resource() {
            SasResource::BlobSnapshot => self.snapshot.clone().unwrap_or_default(),
            SasResource::BlobVersion => self.version_id.clone().unwrap_or_default(),
            _ => String::new(),
        };

        let parts = [
            permissions,
            self.start.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.expiry.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.canonicalized_resource(account),
            self.identifier.clone().unwrap_or_default(),
            self.ip_range.clone().unwrap_or_default(),
            self.protocol.map(|p| p.as_str().to_string()).unwrap_or_default(),
            self.version.clone(),
            self.resource().as_str().to_string(),
            snapshot_time,
            self.encryption_scope.clone().unwrap_or_default(),
            self.cache_control.clone().unwrap_or_default(),
            self.content_disposition.clone().unwrap_or_default(),
            self.content_encoding.clone().unwrap_or_default(),
            self.content_language.clone().unwrap_or_default(),
            self.content_type.clone().unwrap_or_default(),
        ];

        Ok(parts.join("\n"))
    }

    /// Signs the builder and returns the query string (no leading `?`).
    pub fn to_query(&self, credential: &SharedKeyCredential) -> StorageResult<String> {
        let string_to_sign = self.string_to_sign(credential.account())?;
        tracing::debug!("blob SAS string to sign: {:?}", string_to_sign);
        let signature = credential.sign(&string_to_sign)?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("sv", &self.version);
        if let Some(protocol) = self.protocol {
            query.append_pair("spr", protocol.as_str());
        }
        if let Some(start) = self.start {
            query.append_pair("st", &format_sas_datetime(&start));
        }
        if let Some(expiry) = self.expiry {
            query.append_pair("se", &format_sas_datetime(&expiry));
        }
        query.append_pair("sr", self.resource().as_str());
        if !self.permissions.is_empty() {
            query.append_pair("sp", &self.permissions.to_string());
        }
        let optional = [
            ("sip", &self.ip_range),
            ("si", &self.identifier),
            ("ses", &self.encryption_scope),
            ("rscc", &self.cache_control),
            ("rscd", &self.content_disposition),
            ("rsce", &self.content_encoding),
            ("rscl", &self.content_language),
            ("rsct", &self.content_type),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                query.append_pair(name, v);
            }
        }
        query.append_pair("sig", &signature);

        Ok(query.finish())
    }
}

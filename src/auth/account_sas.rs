//! Account SAS generation.

use chrono::{DateTime, Utc};
use url::form_urlencoded;

use crate::config::DEFAULT_SAS_VERSION;
use crate::error::{StorageError, StorageResult};

use super::{format_sas_datetime, SasProtocol, SharedKeyCredential};

/// Builds a signed account SAS query string.
///
/// `services` (`ss`), `resource_types` (`srt`) and `permissions` (`sp`) are
/// kept as the letter strings the service defines, e.g. `b`, `sco`, `rwdlac`.
#[derive(Debug, Clone)]
pub struct AccountSasBuilder {
    services: String,
    resource_types: String,
    permissions: String,
    start: Option<DateTime<Utc>>,
    expiry: DateTime<Utc>,
    ip_range: Option<String>,
    protocol: Option<SasProtocol>,
    encryption_scope: Option<String>,
    version: String,
}

impl AccountSasBuilder {
    pub fn new(
        services: impl Into<String>,
        resource_types: impl Into<String>,
        permissions: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            services: services.into(),
            resource_types: resource_types.into(),
            permissions: permissions.into(),
            start: None,
            expiry,
            ip_range: None,
            protocol: None,
            encryption_scope: None,
            version: DEFAULT_SAS_VERSION.to_string(),
        }
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn ip_range(mut self, ip_range: impl Into<String>) -> Self {
        self.ip_range = Some(ip_range.into());
        self
    }

    pub fn protocol(mut self, protocol: SasProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn encryption_scope(mut self, scope: impl Into<String>) -> Self {
        self.encryption_scope = Some(scope.into());
        self
    }

    fn validate(&self) -> StorageResult<()> {
        if self.services.is_empty() || self.resource_types.is_empty() {
            return Err(StorageError::invalid_argument(
                "account SAS needs services and resource types",
            ));
        }
        if self.permissions.is_empty() {
            return Err(StorageError::invalid_argument("account SAS permissions are required"));
        }
        if let Some(start) = self.start {
            if self.expiry <= start {
                return Err(StorageError::invalid_argument("SAS expiry must be after start"));
            }
        }
        Ok(())
    }

    /// Builds the string-to-sign; it ends with a newline.
    pub fn string_to_sign(&self, account: &str) -> StorageResult<String> {
        self.validate()?;

        let parts = [
            account.to_string(),
            self.permissions.clone(),
            self.services.clone(),
            self.resource_types.clone(),
            self.start.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            format_sas_datetime(&self.expiry),
            self.ip_range.clone().unwrap_or_default(),
            self.protocol.map(|p| p.as_str().to_string()).unwrap_or_default(),
            self.version.clone(),
            self.encryption_scope.clone().unwrap_or_default(),
            String::new(),
        ];

        Ok(parts.join("\n"))
    }

    /// Signs the builder and returns the query string (no leading `?`).
    pub fn to_query(&self, credential: &SharedKeyCredential) -> StorageResult<String> {
        let string_to_sign = self.string_to_sign(credential.account())?;
        tracing::debug!("account SAS string to sign: {:?}", string_to_sign);
        let signature = credential.sign(&string_to_sign)?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("sv", &self.version);
        query.append_pair("ss", &self.services);
        query.append_pair("srt", &self.resource_types);
        query.append_pair("sp", &self.permissions);
        if let Some(start) = self.start {
            query.append_pair("st", &format_sas_datetime(&start));
        }
        query.append_pair("se", &format_sas_datetime(&self.expiry));
        if let Some(ref ip) = self.ip_range {
            query.append_pair("sip", ip);
        }
        if let Some(protocol) = self.protocol {
            query.append_pair("spr", protocol.as_str());
        }
        if let Some(ref scope) = self.encryption_scope {
            query.append_pair("ses", scope);
        }
        query.append_pair("sig", &signature);

        Ok(query.finish())
    }
}

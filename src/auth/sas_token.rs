//! SAS token parsing and verification against an account key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use url::form_urlencoded;

use crate::error::{ErrorCode, StorageError, StorageResult};

use super::{format_sas_datetime, parse_sas_datetime, SharedKeyCredential};

/// The resource a SAS is presented for.
#[derive(Debug, Clone, Copy)]
pub struct SasTarget<'a> {
    pub container: &'a str,
    pub blob: Option<&'a str>,
}

impl<'a> SasTarget<'a> {
    pub fn container(container: &'a str) -> Self {
        Self {
            container,
            blob: None,
        }
    }

    pub fn blob(container: &'a str, blob: &'a str) -> Self {
        Self {
            container,
            blob: Some(blob),
        }
    }
}

/// A parsed SAS query, either service (`sr`) or account (`ss`/`srt`).
#[derive(Debug, Clone)]
pub struct SasToken {
    params: HashMap<String, String>,
    signed_expiry: Option<DateTime<Utc>>,
    signed_start: Option<DateTime<Utc>>,
}

impl SasToken {
    /// Parses a SAS query string, with or without a leading `?`.
    pub fn parse(query: &str) -> StorageResult<Self> {
        let params: HashMap<String, String> =
            form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect();

        for required in ["sv", "sig"] {
            if !params.contains_key(required) {
                return Err(StorageError::invalid_argument(format!(
                    "SAS token is missing '{}'",
                    required
                )));
            }
        }
        if !params.contains_key("sr") && !params.contains_key("ss") {
            return Err(StorageError::invalid_argument(
                "SAS token has neither 'sr' nor 'ss'",
            ));
        }

        let signed_expiry = match params.get("se") {
            Some(raw) => Some(parse_sas_datetime(raw).ok_or_else(|| {
                StorageError::invalid_argument(format!("invalid SAS expiry '{}'", raw))
            })?),
            None => None,
        };
        let signed_start = match params.get("st") {
            Some(raw) => Some(parse_sas_datetime(raw).ok_or_else(|| {
                StorageError::invalid_argument(format!("invalid SAS start '{}'", raw))
            })?),
            None => None,
        };

        Ok(Self {
            params,
            signed_expiry,
            signed_start,
        })
    }

    fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn is_account_sas(&self) -> bool {
        self.params.contains_key("ss")
    }

    pub fn permissions(&self) -> &str {
        self.param("sp")
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.signed_expiry
    }

    /// Checks that the token grants `required_permission` on `target` at
    /// `now` and that its signature was produced with `credential`.
    pub fn authorize(
        &self,
        credential: &SharedKeyCredential,
        target: SasTarget<'_>,
        required_permission: char,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        if self.is_account_sas() {
            if !self.param("ss").contains('b') {
                return Err(StorageError::from_code(
                    ErrorCode::AuthorizationResourceTypeMismatch,
                    "SAS does not grant access to the blob service",
                ));
            }
            let resource_type = if target.blob.is_some() { 'o' } else { 'c' };
            if !self.param("srt").contains(resource_type) {
                return Err(StorageError::from_code(
                    ErrorCode::AuthorizationResourceTypeMismatch,
                    "SAS does not grant access to this resource type",
                ));
            }
        } else {
            match self.param("sr") {
                "c" => {}
                "b" | "bs" | "bv" if target.blob.is_some() => {}
                _ => {
                    return Err(StorageError::from_code(
                        ErrorCode::AuthorizationResourceTypeMismatch,
                        "SAS resource type does not match the request",
                    ))
                }
            }
        }

        if !self.permissions().contains(required_permission) {
            return Err(StorageError::from_code(
                ErrorCode::AuthorizationPermissionMismatch,
                format!("SAS does not grant '{}' permission", required_permission),
            ));
        }

        match self.signed_expiry {
            Some(expiry) if now > expiry => {
                return Err(StorageError::from_code(
                    ErrorCode::AuthenticationFailed,
                    "SAS token has expired",
                ))
            }
            None if !self.params.contains_key("si") => {
                return Err(StorageError::from_code(
                    ErrorCode::AuthenticationFailed,
                    "SAS token has no expiry",
                ))
            }
            _ => {}
        }
        if let Some(start) = self.signed_start {
            if now < start {
                return Err(StorageError::from_code(
                    ErrorCode::AuthenticationFailed,
                    "SAS token is not yet valid",
                ));
            }
        }

        let string_to_sign = if self.is_account_sas() {
            self.account_string_to_sign(credential.account())
        } else {
            self.service_string_to_sign(credential.account(), target)
        };
        let expected = credential.sign(&string_to_sign)?;
        if expected != self.param("sig") {
            tracing::debug!(
                "SAS signature mismatch:\n  Expected: {}\n  Provided: {}\n  StringToSign: {:?}",
                expected,
                self.param("sig"),
                string_to_sign
            );
            return Err(StorageError::from_code(
                ErrorCode::AuthenticationFailed,
                "SAS signature did not match",
            ));
        }

        Ok(())
    }

    fn service_string_to_sign(&self, account: &str, target: SasTarget<'_>) -> String {
        let mut resource = format!("/blob/{}/{}", account, target.container);
        if self.param("sr") != "c" {
            if let Some(blob) = target.blob {
                resource.push('/');
                resource.push_str(blob);
            }
        }

        let fields = [
            self.param("sp").to_string(),
            self.signed_start.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.signed_expiry.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            resource,
            self.param("si").to_string(),
            self.param("sip").to_string(),
            self.param("spr").to_string(),
            self.param("sv").to_string(),
            self.param("sr").to_string(),
            self.snapshot_time().to_string(),
            self.param("ses").to_string(),
            self.param("rscc").to_string(),
            self.param("rscd").to_string(),
            self.param("rsce").to_string(),
            self.param("rscl").to_string(),
            self.param("rsct").to_string(),
        ];
        fields.join("\n")
    }

    /// Snapshot time or version id the token is bound to, read from the
    /// request query the token arrived with.
    fn snapshot_time(&self) -> &str {
        match self.param("sr") {
            "bv" => self
                .params
                .get("versionid")
                .map(String::as_str)
                .unwrap_or_else(|| self.param("snapshot")),
            "bs" => self.param("snapshot"),
            _ => "",
        }
    }

    fn account_string_to_sign(&self, account: &str) -> String {
        let fields = [
            account.to_string(),
            self.param("sp").to_string(),
            self.param("ss").to_string(),
            self.param("srt").to_string(),
            self.signed_start.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.signed_expiry.map(|dt| format_sas_datetime(&dt)).unwrap_or_default(),
            self.param("sip").to_string(),
            self.param("spr").to_string(),
            self.param("sv").to_string(),
            self.param("ses").to_string(),
            String::new(),
        ];
        fields.join("\n")
    }
}

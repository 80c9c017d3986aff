use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::error::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Account name plus decoded account key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl SharedKeyCredential {
    /// Creates a credential from a base64 account key.
    pub fn new(account: impl Into<String>, account_key: &str) -> StorageResult<Self> {
        let account = account.into();
        if account.is_empty() {
            return Err(StorageError::invalid_argument("account name must not be empty"));
        }
        let key = BASE64.decode(account_key).map_err(|e| {
            StorageError::invalid_argument("account key is not valid base64").with_source(e)
        })?;
        Ok(Self { account, key })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Computes the base64 HMAC-SHA256 of `string_to_sign`.
    pub fn sign(&self, string_to_sign: &str) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| StorageError::invalid_argument("failed to create HMAC"))?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// How a pipeline authorizes its requests.
#[derive(Debug, Clone)]
pub enum StorageCredential {
    SharedKey(SharedKeyCredential),
    /// A SAS query string without the leading `?`.
    SasToken(String),
    Anonymous,
}

impl StorageCredential {
    pub fn shared_key(&self) -> Option<&SharedKeyCredential> {
        match self {
            StorageCredential::SharedKey(key) => Some(key),
            _ => None,
        }
    }
}

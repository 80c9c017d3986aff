//! Client configuration.

use clap::{Parser, Subcommand};
use url::Url;

use crate::auth::{SharedKeyCredential, StorageCredential};
use crate::encryption::EncryptionContext;
use crate::error::{StorageError, StorageResult};

/// Default account name for development storage.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Default account key for development storage (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Default blob service port for development storage.
pub const DEFAULT_BLOB_PORT: u16 = 10000;

/// Service version sent as `x-ms-version`.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Signed version used for SAS tokens.
pub const DEFAULT_SAS_VERSION: &str = "2020-12-06";

/// Per-client options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Value of the `x-ms-version` header.
    pub api_version: String,
    /// Server-side encryption applied to every request the client sends.
    pub encryption: EncryptionContext,
    /// Send `Content-MD5` for request bodies.
    pub transactional_md5: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            encryption: EncryptionContext::None,
            transactional_md5: false,
        }
    }
}

impl ClientOptions {
    pub fn with_encryption(mut self, encryption: EncryptionContext) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_transactional_md5(mut self, enabled: bool) -> Self {
        self.transactional_md5 = enabled;
        self
    }
}

/// Parsed storage connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub default_endpoints_protocol: Option<String>,
    pub endpoint_suffix: Option<String>,
    pub blob_endpoint: Option<String>,
    pub shared_access_signature: Option<String>,
}

impl ConnectionString {
    /// Parses `Key=Value;Key=Value` pairs.
    ///
    /// `UseDevelopmentStorage=true` expands to the local emulator endpoint
    /// and the well-known development account.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let mut result = Self::default();

        for part in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::invalid_argument(format!(
                    "connection string segment '{}' is not a key/value pair",
                    part
                ))
            })?;

            match key {
                "AccountName" => result.account_name = Some(value.to_string()),
                "AccountKey" => result.account_key = Some(value.to_string()),
                "DefaultEndpointsProtocol" => {
                    result.default_endpoints_protocol = Some(value.to_string())
                }
                "EndpointSuffix" => result.endpoint_suffix = Some(value.to_string()),
                "BlobEndpoint" => result.blob_endpoint = Some(value.to_string()),
                "SharedAccessSignature" => {
                    result.shared_access_signature = Some(value.to_string())
                }
                "UseDevelopmentStorage" if value.eq_ignore_ascii_case("true") => {
                    result.account_name = Some(DEFAULT_ACCOUNT.to_string());
                    result.account_key = Some(DEFAULT_ACCOUNT_KEY.to_string());
                    result.blob_endpoint = Some(format!(
                        "http://127.0.0.1:{}/{}",
                        DEFAULT_BLOB_PORT, DEFAULT_ACCOUNT
                    ));
                }
                other => {
                    tracing::debug!("ignoring connection string key {}", other);
                }
            }
        }

        if result.blob_endpoint.is_none() && result.account_name.is_none() {
            return Err(StorageError::invalid_argument(
                "connection string has neither BlobEndpoint nor AccountName",
            ));
        }

        Ok(result)
    }

    /// Returns the blob service endpoint.
    pub fn blob_endpoint(&self) -> StorageResult<Url> {
        let raw = match (&self.blob_endpoint, &self.account_name) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(account)) => format!(
                "{}://{}.blob.{}",
                self.default_endpoints_protocol.as_deref().unwrap_or("https"),
                account,
                self.endpoint_suffix.as_deref().unwrap_or("core.windows.net")
            ),
            (None, None) => {
                return Err(StorageError::invalid_argument(
                    "connection string has no blob endpoint",
                ))
            }
        };

        Url::parse(&raw).map_err(|e| {
            StorageError::invalid_argument(format!("invalid blob endpoint '{}'", raw))
                .with_source(e)
        })
    }

    /// Returns the credential described by the connection string.
    ///
    /// An account key wins over a SAS token; neither means anonymous access.
    pub fn credential(&self) -> StorageResult<StorageCredential> {
        match (&self.account_name, &self.account_key, &self.shared_access_signature) {
            (Some(name), Some(key), _) => Ok(StorageCredential::SharedKey(
                SharedKeyCredential::new(name, key)?,
            )),
            (_, _, Some(sas)) => Ok(StorageCredential::SasToken(
                sas.trim_start_matches('?').to_string(),
            )),
            _ => Ok(StorageCredential::Anonymous),
        }
    }
}

/// Command-line arguments for `blobctl`.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobctl")]
#[command(about = "Azure Blob Storage protocol client")]
#[command(version)]
pub struct Args {
    /// Storage connection string; defaults to development storage.
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Enable debug logging.
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's', global = true)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Returns the connection string to use.
    pub fn connection_string(&self) -> String {
        self.connection_string
            .clone()
            .unwrap_or_else(|| "UseDevelopmentStorage=true".to_string())
    }
}

/// `blobctl` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a container.
    CreateContainer {
        name: String,
        /// Default encryption scope for blobs in the container.
        #[arg(long)]
        encryption_scope: Option<String>,
        /// Reject writes that name a different encryption scope.
        #[arg(long, requires = "encryption_scope")]
        prevent_override: bool,
    },
    /// Delete a container.
    DeleteContainer { name: String },
    /// List blobs in a container.
    List {
        container: String,
        #[arg(long)]
        prefix: Option<String>,
        /// List hierarchically using this delimiter.
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        max_results: Option<u32>,
        /// Print one JSON object per entry.
        #[arg(long)]
        json: bool,
    },
    /// Lease a container, or a blob when `--blob` is given.
    Lease {
        container: String,
        #[arg(long)]
        blob: Option<String>,
        #[command(subcommand)]
        action: LeaseCommand,
    },
    /// Generate a service SAS for a container or blob.
    Sas {
        container: String,
        #[arg(long)]
        blob: Option<String>,
        /// Permission letters, e.g. `rl`.
        #[arg(long, default_value = "r")]
        permissions: String,
        /// Lifetime in minutes.
        #[arg(long, default_value_t = 60)]
        expiry_minutes: i64,
    },
}

/// Lease subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum LeaseCommand {
    Acquire {
        /// Seconds (15-60) or -1 for infinite.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        duration: i32,
        #[arg(long)]
        proposed_id: Option<String>,
    },
    Renew { lease_id: String },
    Change { lease_id: String, proposed_id: String },
    Release { lease_id: String },
    Break {
        #[arg(long)]
        period: Option<u32>,
    },
}

//! azblob-rs: Azure Blob Storage protocol client in Rust.
//!
//! Builds, signs and sends Blob service requests and turns the responses
//! into typed results. Covers containers, block, append and page blobs,
//! leases, paged listings, SAS tokens and server-side encryption with
//! customer-provided keys or encryption scopes.
//!
//! # Example
//!
//! ```no_run
//! use azblob_rs::{ClientOptions, ContainerClient, CreateContainerOptions, UploadBlobOptions};
//!
//! #[tokio::main]
//! async fn main() -> azblob_rs::StorageResult<()> {
//!     let container = ContainerClient::from_connection_string(
//!         "UseDevelopmentStorage=true",
//!         "samples",
//!         ClientOptions::default(),
//!     )?;
//!     container.create(&CreateContainerOptions::default()).await?;
//!
//!     let blob = container.block_blob_client("hello.txt")?;
//!     blob.upload("hello", &UploadBlobOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod clients;
pub mod config;
pub mod encryption;
pub mod error;
pub mod lease;
pub mod listing;
pub mod models;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod transport;
pub mod xml;

// Re-exports for convenience
pub use auth::{BlobSasBuilder, BlobSasPermissions, SharedKeyCredential, StorageCredential};
pub use clients::{
    AppendBlobClient, BlobClient, BlobOperations, BlockBlobClient, ContainerClient,
    LeaseOperations, PageBlobClient, ResourceClient, UploadBlobOptions,
};
pub use config::{ClientOptions, ConnectionString, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY};
pub use encryption::{CustomerProvidedKey, EncryptionContext};
pub use error::{ErrorCode, ErrorKind, StorageError, StorageResult};
pub use lease::{LeaseAction, LeaseDuration};
pub use listing::{BlobLister, ListBlobsInclude, ListBlobsOptions, ListingMode, ListingPage};
pub use models::CreateContainerOptions;
pub use pipeline::Pipeline;
pub use response::Response;
pub use transport::{ReqwestTransport, Transport};

//! blobctl: command-line driver for the azblob-rs client.

use chrono::{Duration, Utc};
use clap::Parser;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use azblob_rs::config::{Args, Command, LeaseCommand};
use azblob_rs::{
    BlobClient, BlobSasBuilder, BlobSasPermissions, ClientOptions, ContainerClient,
    CreateContainerOptions, LeaseDuration, LeaseOperations, ListBlobsOptions, ListingMode,
    Pipeline, ResourceClient, StorageError,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let connection_string = args.connection_string();
    let pipeline = Arc::new(Pipeline::from_connection_string(
        &connection_string,
        ClientOptions::default(),
    )?);

    match args.command {
        Command::CreateContainer {
            name,
            encryption_scope,
            prevent_override,
        } => {
            let container = ContainerClient::new(pipeline, name)?;
            let options = CreateContainerOptions {
                default_encryption_scope: encryption_scope,
                prevent_encryption_scope_override: prevent_override,
                ..Default::default()
            };
            let created = container.create(&options).await?;
            info!(
                container = container.name(),
                etag = %created.etag,
                request_id = created.request_id().unwrap_or(""),
                "container created"
            );
        }
        Command::DeleteContainer { name } => {
            let container = ContainerClient::new(pipeline, name)?;
            container.delete(None).await?;
            info!(container = container.name(), "container deleted");
        }
        Command::List {
            container,
            prefix,
            delimiter,
            max_results,
            json,
        } => {
            let container = ContainerClient::new(pipeline, container)?;
            let mode = match delimiter {
                Some(delimiter) => ListingMode::Hierarchy { delimiter },
                None => ListingMode::Flat,
            };
            let options = ListBlobsOptions {
                prefix,
                max_results,
                ..Default::default()
            };

            let mut pages = Box::pin(container.list_blobs(mode, options)?.into_stream());
            let mut count = 0usize;
            while let Some(page) = pages.try_next().await? {
                for prefix in &page.prefixes {
                    if json {
                        println!("{}", serde_json::json!({ "prefix": prefix.name }));
                    } else {
                        println!("{}", prefix.name);
                    }
                }
                for item in &page.items {
                    if json {
                        let entry = serde_json::json!({
                            "name": item.name,
                            "size": item.content_length,
                            "etag": item.etag,
                            "blobType": item.blob_type.map(|t| t.as_str()),
                            "lastModified": item.last_modified.map(|t| t.to_rfc3339()),
                            "snapshot": item.snapshot,
                            "encryptionScope": item.encryption_scope,
                        });
                        println!("{}", entry);
                    } else {
                        println!("{}\t{}", item.name, item.content_length);
                    }
                    count += 1;
                }
            }
            info!(blobs = count, "listing complete");
        }
        Command::Lease {
            container,
            blob,
            action,
        } => match blob {
            Some(blob) => run_lease(&BlobClient::new(pipeline, container, blob)?, action).await?,
            None => run_lease(&ContainerClient::new(pipeline, container)?, action).await?,
        },
        Command::Sas {
            container,
            blob,
            permissions,
            expiry_minutes,
        } => {
            let credential = pipeline.credential().shared_key().ok_or_else(|| {
                StorageError::invalid_argument("generating a SAS requires an account key")
            })?;
            let mut builder = BlobSasBuilder::new(container.as_str())
                .permissions(BlobSasPermissions::parse(&permissions)?)
                .expiry(Utc::now() + Duration::minutes(expiry_minutes));
            let url = match blob {
                Some(blob) => {
                    builder = builder.blob(blob.as_str());
                    BlobClient::new(Arc::clone(&pipeline), container, blob)?.url()?
                }
                None => ContainerClient::new(Arc::clone(&pipeline), container)?.url()?,
            };
            let query = builder.to_query(credential)?;
            println!("{}?{}", url, query);
        }
    }

    Ok(())
}

async fn run_lease<C: LeaseOperations>(client: &C, action: LeaseCommand) -> Result<(), BoxError> {
    match action {
        LeaseCommand::Acquire {
            duration,
            proposed_id,
        } => {
            let duration = LeaseDuration::from_seconds(duration)?;
            let lease = client.acquire_lease(duration, proposed_id.as_deref()).await?;
            info!(lease_id = lease.lease_id.as_deref().unwrap_or(""), "lease acquired");
        }
        LeaseCommand::Renew { lease_id } => {
            client.renew_lease(&lease_id).await?;
            info!(lease_id = %lease_id, "lease renewed");
        }
        LeaseCommand::Change {
            lease_id,
            proposed_id,
        } => {
            let lease = client.change_lease(&lease_id, &proposed_id).await?;
            info!(lease_id = lease.lease_id.as_deref().unwrap_or(""), "lease changed");
        }
        LeaseCommand::Release { lease_id } => {
            client.release_lease(&lease_id).await?;
            info!(lease_id = %lease_id, "lease released");
        }
        LeaseCommand::Break { period } => {
            let broken = client.break_lease(period).await?;
            info!(lease_time = broken.lease_time, "lease broken");
        }
    }
    Ok(())
}

//! Blob listing with continuation markers, flat or by hierarchy.

use futures::stream::{self, Stream};
use std::ops::BitOr;
use std::sync::Arc;

use crate::encryption::{self, OperationKind};
use crate::error::{StorageError, StorageResult};
use crate::models::BlobItem;
use crate::pipeline::Pipeline;
use crate::request::StorageRequest;
use crate::response::Response;
use crate::xml::parse_blob_list;

/// A virtual directory returned by a hierarchical listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPrefix {
    pub name: String,
}

/// One page of a List Blobs response.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub service_endpoint: String,
    pub container_name: String,
    pub prefix: Option<String>,
    /// Echoed only by hierarchical listings.
    pub delimiter: Option<String>,
    pub items: Vec<BlobItem>,
    /// Always empty for flat listings.
    pub prefixes: Vec<BlobPrefix>,
    /// `None` on the last page.
    pub next_marker: Option<String>,
}

/// Extra datasets a listing should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListBlobsInclude(u8);

impl ListBlobsInclude {
    pub const NONE: Self = Self(0);
    pub const SNAPSHOTS: Self = Self(1);
    pub const VERSIONS: Self = Self(1 << 1);
    pub const DELETED: Self = Self(1 << 2);
    pub const METADATA: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::SNAPSHOTS, "snapshots"),
        (Self::VERSIONS, "versions"),
        (Self::DELETED, "deleted"),
        (Self::METADATA, "metadata"),
    ];

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Comma-joined `include` query value.
    pub fn to_query_value(&self) -> String {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl BitOr for ListBlobsInclude {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Options for a listing.
#[derive(Debug, Clone, Default)]
pub struct ListBlobsOptions {
    pub prefix: Option<String>,
    /// Page size hint; the service may return fewer entries.
    pub max_results: Option<u32>,
    pub include: ListBlobsInclude,
    /// Continuation marker to start from.
    pub marker: Option<String>,
}

/// Flat or hierarchical enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingMode {
    Flat,
    Hierarchy { delimiter: String },
}

/// Issues one List Blobs request.
pub(crate) async fn fetch_page(
    pipeline: &Pipeline,
    request: StorageRequest,
    mode: &ListingMode,
    options: &ListBlobsOptions,
    marker: Option<&str>,
) -> StorageResult<Response<ListingPage>> {
    if let ListingMode::Hierarchy { delimiter } = mode {
        if delimiter.is_empty() {
            return Err(StorageError::invalid_argument("delimiter must not be empty"));
        }
    }
    if options.max_results == Some(0) {
        return Err(StorageError::invalid_argument("max_results must be positive"));
    }

    let include = options.include.to_query_value();
    let max_results = options.max_results.map(|m| m.to_string());
    let delimiter = match mode {
        ListingMode::Flat => None,
        ListingMode::Hierarchy { delimiter } => Some(delimiter.as_str()),
    };

    let request = request
        .with_query("restype", "container")
        .with_query("comp", "list")
        .with_optional_query("prefix", options.prefix.as_deref())
        .with_optional_query("delimiter", delimiter)
        .with_optional_query("marker", marker)
        .with_optional_query("maxresults", max_results.as_deref())
        .with_optional_query("include", Some(include.as_str()).filter(|i| !i.is_empty()))
        .with_headers(encryption::resolve(
            &pipeline.options().encryption,
            OperationKind::ListBlobs,
        )?);

    let raw = pipeline.send(request).await?;
    let page = parse_blob_list(raw.body_str()?)?;
    Ok(Response::from_raw(&raw, page))
}

/// Cursor over the pages of a listing.
///
/// The marker advances only after a page was received and parsed, so a
/// failed or cancelled fetch can simply be retried.
#[derive(Debug, Clone)]
pub struct BlobLister {
    pipeline: Arc<Pipeline>,
    container_url: url::Url,
    mode: ListingMode,
    options: ListBlobsOptions,
    marker: Option<String>,
    exhausted: bool,
}

impl BlobLister {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        container_url: url::Url,
        mode: ListingMode,
        options: ListBlobsOptions,
    ) -> Self {
        let marker = options.marker.clone();
        Self {
            pipeline,
            container_url,
            mode,
            options,
            marker,
            exhausted: false,
        }
    }

    /// Marker the next fetch will send.
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn mode(&self) -> &ListingMode {
        &self.mode
    }

    /// Fetches the next page, or `None` once the listing is exhausted.
    pub async fn fetch_next(&mut self) -> StorageResult<Option<Response<ListingPage>>> {
        if self.exhausted {
            return Ok(None);
        }

        let request = StorageRequest::get(self.container_url.clone());
        let page = fetch_page(
            &self.pipeline,
            request,
            &self.mode,
            &self.options,
            self.marker.as_deref(),
        )
        .await?;

        match page.next_marker.clone() {
            Some(next) => self.marker = Some(next),
            None => {
                self.marker = None;
                self.exhausted = true;
            }
        }
        Ok(Some(page))
    }

    /// Restarts the listing from the marker it was created with.
    pub fn reset(&mut self) {
        self.marker = self.options.marker.clone();
        self.exhausted = false;
    }

    /// Lazy forward-only stream of pages. Nothing is fetched ahead.
    pub fn into_stream(self) -> impl Stream<Item = StorageResult<Response<ListingPage>>> {
        stream::try_unfold(self, |mut lister| async move {
            Ok(lister.fetch_next().await?.map(|page| (page, lister)))
        })
    }
}

//! Download requests and the content provider contract.
//!
//! A [`DownloadRequest`] is what callers hand to
//! [`DownloadManager::add_download`](crate::DownloadManager::add_download).
//! It is usually built from a [`ResolvedContent`] returned by a
//! [`ContentProvider`], the connector that turns a service-specific content
//! identifier into a concrete URL.
//!
//! # Examples
//!
//! ```rust
//! use haul::download::{ContentInfo, DownloadRequest, SourceRef};
//!
//! let request = DownloadRequest::from_url(
//!     "https://example.com/media/Big%20Buck%20Bunny.mkv",
//!     "/tmp/downloads",
//!     SourceRef::new("svc-1", "radarr"),
//!     ContentInfo::new("Big Buck Bunny", "movie"),
//! )?;
//! assert_eq!(request.transfer.file_name, "Big Buck Bunny.mkv");
//! # Ok::<(), haul::Error>(())
//! ```

use super::item::{ContentInfo, SourceRef, TransferSpec};
use crate::error::Error;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Concrete download location resolved by a content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContent {
    pub source_url: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    /// Size in bytes, 0 when unknown.
    pub size: u64,
    pub checksum: Option<String>,
}

/// Resolves a content identifier of one service into a downloadable file.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn resolve(&self, content_id: &str) -> Result<ResolvedContent, Error>;
}

/// Everything needed to create a download item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source: SourceRef,
    pub content: ContentInfo,
    pub transfer: TransferSpec,
    /// Overrides the manager's default retry budget.
    pub max_retries: Option<u32>,
}

impl DownloadRequest {
    /// Creates a request.
    pub fn new(source: SourceRef, content: ContentInfo, transfer: TransferSpec) -> Self {
        Self {
            source,
            content,
            transfer,
            max_retries: None,
        }
    }

    /// Builds a request saving the resolved file under `directory`.
    pub fn from_resolved(
        source: SourceRef,
        mut content: ContentInfo,
        resolved: ResolvedContent,
        directory: impl AsRef<Path>,
    ) -> Self {
        if content.size_hint.is_none() && resolved.size > 0 {
            content.size_hint = Some(resolved.size);
        }
        let transfer = TransferSpec {
            destination_path: directory.as_ref().join(&resolved.file_name),
            source_url: resolved.source_url,
            file_name: resolved.file_name,
            mime_type: resolved.mime_type,
            expected_size: resolved.size,
            checksum: resolved.checksum,
        };
        Self::new(source, content, transfer)
    }

    /// Builds a request from a bare URL, using its last path segment as file name.
    pub fn from_url(
        url: &str,
        directory: impl AsRef<Path>,
        source: SourceRef,
        content: ContentInfo,
    ) -> Result<Self, Error> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Validation(format!("The url \"{}\" cannot be parsed: {}", url, e)))?;
        let file_name = file_name_from_url(&parsed)?;
        let expected_size = content.size_hint.unwrap_or(0);
        let transfer = TransferSpec {
            source_url: parsed.to_string(),
            destination_path: directory.as_ref().join(&file_name),
            file_name,
            mime_type: None,
            expected_size,
            checksum: None,
        };
        Ok(Self::new(source, content, transfer))
    }

    /// Sets the retry budget of this request.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the expected SHA-256 checksum.
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.transfer.checksum = Some(checksum.into());
        self
    }
}

/// Extracts and percent-decodes the last path segment of `url`.
fn file_name_from_url(url: &Url) -> Result<String, Error> {
    let segment = url
        .path_segments()
        .ok_or_else(|| {
            Error::Validation(format!("The url \"{}\" does not contain a valid path", url))
        })?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| {
            Error::Validation(format!("The url \"{}\" does not contain a filename", url))
        })?;

    Ok(form_urlencoded::parse(segment.as_bytes())
        .map(|(key, val)| [key, val].concat())
        .collect())
}

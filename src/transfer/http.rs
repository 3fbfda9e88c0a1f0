//! Reference executor transferring files over HTTP(S).
//!
//! [`HttpExecutor`] streams the response body straight into the destination
//! file. When a partial file is already on disk and the server advertises
//! byte ranges, the transfer continues from the partial file's length, so a
//! download paused before a restart does not start over. A partial file that
//! already holds the whole remote file (the server answers `416` with a matching
//! `Content-Range: bytes */<len>`) is verified and reported as finished. Otherwise
//! the file is truncated and fetched from the first byte.
//!
//! # Examples
//!
//! ```rust,no_run
//! use haul::transfer::{HttpClientConfig, HttpExecutor};
//!
//! # fn example() -> Result<(), haul::Error> {
//! let executor = HttpExecutor::new(HttpClientConfig::default())?;
//! # Ok(())
//! # }
//! ```

use super::client::{create_http_client, HttpClientConfig};
use super::executor::{ProgressReporter, TransferExecutor, TransferOutcome, TransferRequest};
use crate::download::hash::verify_hash;
use crate::download::DownloadId;
use crate::error::{Error, TransferError};
use crate::utils::content_length::{parse_content_range_total, total_size};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{
    header::{ACCEPT_RANGES, CONTENT_RANGE, RANGE},
    Response, StatusCode, Url,
};
use reqwest_middleware::ClientWithMiddleware;
use std::path::Path;
use tokio::{fs, fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

/// Transfers downloads with a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: ClientWithMiddleware,
}

impl HttpExecutor {
    /// Creates an executor with a freshly configured client.
    pub fn new(config: HttpClientConfig) -> Result<Self, Error> {
        Ok(Self::with_client(create_http_client(config)?))
    }

    /// Creates an executor around an existing client.
    pub fn with_client(client: ClientWithMiddleware) -> Self {
        Self { client }
    }

    /// Check whether the server accepts range requests for `url`.
    async fn is_resumable(&self, url: &Url) -> Result<bool, TransferError> {
        let res = self.client.head(url.clone()).send().await?;
        match res.headers().get(ACCEPT_RANGES) {
            None => Ok(false),
            Some(x) if x == "none" => Ok(false),
            Some(_) => Ok(true),
        }
    }

    /// Length of the partial file on disk, 0 when there is none.
    async fn size_on_disk(path: &Path) -> u64 {
        fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// GET `url`, asking for the bytes from `offset` on when it is not 0.
    async fn fetch(&self, url: &Url, offset: u64) -> Result<Response, TransferError> {
        debug!("Fetching {} from byte {}", url, offset);
        let mut req = self.client.get(url.clone());
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={}-", offset));
        }
        Ok(req.send().await?)
    }

    /// Fails when the file at `path` does not match `checksum`.
    async fn verify_checksum(checksum: Option<String>, path: &Path) -> Result<(), TransferError> {
        let Some(checksum) = checksum else {
            return Ok(());
        };
        let file = path.to_path_buf();
        let matches = tokio::task::spawn_blocking(move || verify_hash(&file, Some(checksum.as_str())))
            .await
            .map_err(|e| TransferError::unknown(e.to_string()))??;
        if !matches {
            return Err(TransferError::unknown(format!(
                "checksum mismatch for {}",
                path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TransferExecutor for HttpExecutor {
    async fn start(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<TransferOutcome, TransferError> {
        let url = Url::parse(&request.source_url).map_err(|e| {
            TransferError::unknown(format!("invalid url \"{}\": {}", request.source_url, e))
        })?;
        let output = request.destination_path.clone();
        if !request.allow_metered {
            debug!(
                "Metered connections are disallowed for {}, but link metering cannot be detected here",
                request.id
            );
        }

        let mut offset = Self::size_on_disk(&output).await;
        if offset > 0 && !self.is_resumable(&url).await? {
            debug!("Server does not accept ranges, restarting {} from zero", request.id);
            offset = 0;
        }

        let mut res = self.fetch(&url, offset).await?;
        if offset > 0 && res.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            let remote_size = res
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total);
            if remote_size == Some(offset) {
                debug!("{} is already complete on disk", request.id);
                progress.report(offset, offset);
                Self::verify_checksum(request.checksum.clone(), &output).await?;
                return Ok(TransferOutcome::ok(output));
            }
            debug!(
                "Partial file of {} does not match the remote size {:?}, restarting from zero",
                request.id, remote_size
            );
            offset = 0;
            res = self.fetch(&url, 0).await?;
        }

        let status = res.status();
        if !status.is_success() {
            return Ok(TransferOutcome {
                status,
                final_path: output,
            });
        }
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            debug!("Range ignored by server, restarting {} from zero", request.id);
            offset = 0;
        }

        let mut expected = total_size(&res, offset);
        if expected == 0 {
            expected = request.expected_size;
        }

        if let Some(output_dir) = output.parent() {
            debug!("Creating destination directory {:?}", output_dir);
            fs::create_dir_all(output_dir).await?;
        }

        debug!("Opening destination file {:?}", &output);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(offset > 0)
            .truncate(offset == 0)
            .open(&output)
            .await?;

        let mut written = offset;
        progress.report(written, expected);

        let mut stream = res.bytes_stream();
        while let Some(item) = stream.next().await {
            let mut chunk = item?;
            written += chunk.len() as u64;
            file.write_all_buf(&mut chunk).await?;
            if !progress.report(written, expected) {
                debug!("Progress listener gone, stopping {}", request.id);
                file.flush().await?;
                return Err(TransferError::unknown("transfer abandoned"));
            }
        }
        file.flush().await?;
        drop(file);

        Self::verify_checksum(request.checksum.clone(), &output).await?;

        Ok(TransferOutcome {
            status,
            final_path: output,
        })
    }

    /// Nothing to do: the transfer stops when the scheduler drops the future
    /// returned by [`start`](TransferExecutor::start).
    async fn pause(&self, id: DownloadId) -> Result<(), TransferError> {
        debug!("Pause requested for {}", id);
        Ok(())
    }
}
